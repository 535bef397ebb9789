//! Peak detection: convolve → cap → sort → threshold → suppress.
//!
//! Each stage is a pure function producing a new container; the
//! [`PeakDetector`] strings them together and caches the matched-filter
//! kernel across calls. Candidate order is fully deterministic: voxels are
//! ranked by response value with stable ties in channel-major flattening
//! order, and suppression scans in that order.

use super::config::{DetectionConfig, SuppressionScope};
use super::error::EngineError;
use super::kernel::Kernel;
use crate::core::grid::AtomGrid;
use crate::core::grid::tensor::GridTensor;
use crate::core::typing::AtomTyper;
use itertools::iproduct;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use std::collections::HashMap;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One ranked voxel: response value, voxel index, element channel.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    pub value: f64,
    pub voxel: [usize; 3],
    pub channel: usize,
}

/// A detected atom candidate with its world coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub coord: Point3<f64>,
    pub voxel: [usize; 3],
    pub channel: usize,
    pub score: f64,
}

/// Same-size zero-padded cross-correlation, each channel against its own
/// kernel channel.
///
/// For non-negative inputs the unit center gain guarantees the response norm
/// of every channel is at least the input's; checked in debug builds.
pub fn convolve(values: &GridTensor, kernel: &Kernel) -> GridTensor {
    assert_eq!(
        values.channels(),
        kernel.channels(),
        "grid/kernel channel mismatch",
    );
    let n = values.size();
    let k = kernel.size();
    let mid = (k / 2) as i64;

    let mut out = GridTensor::zeros(values.channels(), n);
    let per = out.voxels_per_channel();

    let fill = |(c, buf): (usize, &mut [f64])| {
        for (x, y, z) in iproduct!(0..n, 0..n, 0..n) {
            let mut acc = 0.0;
            for (i, j, l) in iproduct!(0..k, 0..k, 0..k) {
                let sx = x as i64 + i as i64 - mid;
                let sy = y as i64 + j as i64 - mid;
                let sz = z as i64 + l as i64 - mid;
                if sx < 0 || sy < 0 || sz < 0 {
                    continue;
                }
                let (sx, sy, sz) = (sx as usize, sy as usize, sz as usize);
                if sx >= n || sy >= n || sz >= n {
                    continue;
                }
                acc += kernel.get(c, i, j, l) * values.get(c, sx, sy, sz);
            }
            buf[(x * n + y) * n + z] = acc;
        }
    };

    #[cfg(feature = "parallel")]
    out.values_mut().par_chunks_mut(per).enumerate().for_each(fill);

    #[cfg(not(feature = "parallel"))]
    out.values_mut().chunks_mut(per).enumerate().for_each(fill);

    #[cfg(debug_assertions)]
    for c in 0..values.channels() {
        if values.channel_min(c) >= 0.0 {
            debug_assert!(
                out.channel_norm(c) >= values.channel_norm(c) - 1e-9,
                "matched filtering reduced channel {} energy",
                c,
            );
        }
    }

    out
}

/// Clamps response values to `peak_value`, keeping one dominant atom from
/// masking weaker neighbors in the ranking.
pub fn apply_peak_value(values: &GridTensor, peak_value: f64) -> GridTensor {
    values.clamp_max(peak_value)
}

/// All (value, voxel, channel) triples in descending value order.
///
/// The sort is stable over channel-major flattening order, so ties are
/// deterministic. Indexing the input by any returned triple reproduces its
/// value exactly.
pub fn sort_grid_points(values: &GridTensor) -> Vec<GridPoint> {
    let n = values.size();
    let mut points = Vec::with_capacity(values.channels() * n * n * n);
    for (c, x, y, z) in iproduct!(0..values.channels(), 0..n, 0..n, 0..n) {
        points.push(GridPoint {
            value: values.get(c, x, y, z),
            voxel: [x, y, z],
            channel: c,
        });
    }
    points.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    points
}

/// Keeps points whose value strictly exceeds `threshold`.
pub fn apply_threshold(points: Vec<GridPoint>, threshold: f64) -> Vec<GridPoint> {
    points.into_iter().filter(|p| p.value > threshold).collect()
}

/// Greedy non-maximum suppression over descending-value candidates.
///
/// A candidate is accepted iff its distance to every previously accepted
/// candidate within scope exceeds `min_dist`. Returns indices into `points`
/// in acceptance (descending-value) order. The pairwise-matrix and
/// incremental-scan evaluations are interchangeable performance variants and
/// produce identical results.
pub fn suppress_non_max(
    points: &[GridPoint],
    coords: &[Point3<f64>],
    min_dist: f64,
    scope: SuppressionScope,
) -> Vec<usize> {
    if points.len() <= MATRIX_SUPPRESSION_LIMIT {
        suppress_matrix(points, coords, min_dist, scope)
    } else {
        suppress_scan(points, coords, min_dist, scope)
    }
}

/// Above this candidate count the full pairwise matrix stops paying for
/// itself and the k-d scan takes over.
const MATRIX_SUPPRESSION_LIMIT: usize = 256;

fn suppress_matrix(
    points: &[GridPoint],
    coords: &[Point3<f64>],
    min_dist: f64,
    scope: SuppressionScope,
) -> Vec<usize> {
    assert_eq!(points.len(), coords.len(), "points/coords length mismatch");
    let n = points.len();
    let min_dist_sq = min_dist * min_dist;

    let mut dist_sq = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            dist_sq[i * n + j] = (coords[i] - coords[j]).norm_squared();
        }
    }

    let mut accepted: Vec<usize> = Vec::new();
    for i in 0..n {
        let blocked = accepted.iter().any(|&j| {
            in_scope(&points[i], &points[j], scope) && dist_sq[i * n + j] <= min_dist_sq
        });
        if !blocked {
            accepted.push(i);
        }
    }
    accepted
}

fn suppress_scan(
    points: &[GridPoint],
    coords: &[Point3<f64>],
    min_dist: f64,
    scope: SuppressionScope,
) -> Vec<usize> {
    assert_eq!(points.len(), coords.len(), "points/coords length mismatch");
    let min_dist_sq = min_dist * min_dist;
    // pad the query radius so boundary-exact neighbors are always returned,
    // then apply the exact rejection predicate ourselves
    let query_radius = min_dist_sq + min_dist_sq * 1e-9 + 1e-12;

    let mut trees: HashMap<usize, KdTree<f64, 3>> = HashMap::new();
    let mut accepted = Vec::new();
    for (i, point) in points.iter().enumerate() {
        let key = match scope {
            SuppressionScope::SameChannel => point.channel,
            SuppressionScope::AllChannels => 0,
        };
        let query = [coords[i].x, coords[i].y, coords[i].z];
        let blocked = trees.get(&key).is_some_and(|tree| {
            tree.within_unsorted::<SquaredEuclidean>(&query, query_radius)
                .iter()
                .any(|nn| nn.distance <= min_dist_sq)
        });
        if !blocked {
            trees.entry(key).or_insert_with(KdTree::new).add(&query, i as u64);
            accepted.push(i);
        }
    }
    accepted
}

#[inline]
fn in_scope(a: &GridPoint, b: &GridPoint, scope: SuppressionScope) -> bool {
    match scope {
        SuppressionScope::SameChannel => a.channel == b.channel,
        SuppressionScope::AllChannels => true,
    }
}

/// Runs the full detection pipeline and caches the kernel across calls.
#[derive(Debug)]
pub struct PeakDetector {
    config: DetectionConfig,
    kernel: Option<Kernel>,
}

impl PeakDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            kernel: None,
        }
    }

    /// The matched filter for this resolution and typing scheme, built on
    /// first use.
    pub fn kernel(
        &mut self,
        resolution: f64,
        typer: &dyn AtomTyper,
    ) -> Result<&Kernel, EngineError> {
        if self.kernel.is_none() {
            self.kernel = Some(Kernel::build(resolution, typer)?);
        }
        Ok(self.kernel.as_ref().unwrap())
    }

    /// Ranked, spatially separated candidates extracted from `values`, an
    /// element-channel tensor sharing `grid`'s geometry.
    ///
    /// The detection cap (`n_atoms_detect`) is *not* applied here; callers
    /// that need it use [`PeakDetector::detect_atoms`].
    pub fn detect_candidates(
        &mut self,
        grid: &AtomGrid,
        values: &GridTensor,
    ) -> Result<Vec<Candidate>, EngineError> {
        let typer = grid.typer().clone();
        assert_eq!(
            values.channels(),
            typer.n_elem_types(),
            "detection input must cover exactly the element channels",
        );

        let response = if self.config.apply_conv {
            let kernel = self.kernel(grid.resolution(), typer.as_ref())?;
            convolve(values, kernel)
        } else {
            values.clone()
        };
        let capped = apply_peak_value(&response, self.config.peak_value);
        let ranked = apply_threshold(sort_grid_points(&capped), self.config.threshold);

        let coords: Vec<Point3<f64>> = ranked
            .iter()
            .map(|p| grid.voxel_center(p.voxel[0], p.voxel[1], p.voxel[2]))
            .collect();
        let accepted = suppress_non_max(
            &ranked,
            &coords,
            self.config.min_dist,
            self.config.suppression_scope,
        );
        debug!(
            ranked = ranked.len(),
            accepted = accepted.len(),
            "peak detection pass"
        );

        Ok(accepted
            .into_iter()
            .map(|i| Candidate {
                coord: coords[i],
                voxel: ranked[i].voxel,
                channel: ranked[i].channel,
                score: ranked[i].value,
            })
            .collect())
    }

    /// Detects atoms on the grid's element channels and expands them into
    /// coordinates plus full-width type vectors, keeping at most
    /// `n_atoms_detect` highest-scoring candidates when a cap is configured.
    pub fn detect_atoms(
        &mut self,
        grid: &AtomGrid,
    ) -> Result<(Vec<Point3<f64>>, Vec<Vec<f64>>), EngineError> {
        let mut candidates = self.detect_candidates(grid, &grid.elem_values())?;
        if let Some(cap) = self.config.n_atoms_detect {
            candidates.truncate(cap);
        }
        let typer = grid.typer();
        let coords = candidates.iter().map(|c| c.coord).collect();
        let types = candidates
            .iter()
            .map(|c| typer.type_vector(c.channel))
            .collect();
        Ok((coords, types))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::render::GridRenderer;
    use crate::core::typing::ElementTyper;
    use std::sync::Arc;

    fn typer() -> Arc<ElementTyper> {
        Arc::new(ElementTyper::from_symbols(&["C", "N", "O"]).unwrap())
    }

    fn config() -> DetectionConfig {
        DetectionConfig {
            apply_conv: false,
            threshold: 0.1,
            peak_value: 1.5,
            min_dist: 0.0,
            suppression_scope: SuppressionScope::SameChannel,
            n_atoms_detect: None,
        }
    }

    /// A 15³ grid at 0.5 resolution holding one C, one N, and one O atom.
    fn rendered_grid() -> AtomGrid {
        let typer = typer();
        let renderer = GridRenderer::new(0.5, 15, Point3::origin());
        let coords = vec![
            Point3::new(-1.5, 0.0, 0.0),
            Point3::new(1.5, 0.0, 0.0),
            Point3::new(0.0, 1.5, 0.5),
        ];
        let types = vec![
            typer.type_vector(0),
            typer.type_vector(1),
            typer.type_vector(2),
        ];
        let radii = vec![0.77, 0.75, 0.73];
        let values = renderer.render(&coords, &types, &radii, 3);
        AtomGrid::new(values, 0.5, Point3::origin(), typer).unwrap()
    }

    #[test]
    fn convolution_does_not_decrease_any_channel_norm() {
        let grid = rendered_grid();
        let kernel = Kernel::build(0.5, grid.typer().as_ref()).unwrap();
        let values = grid.elem_values();
        let response = convolve(&values, &kernel);
        for c in 0..values.channels() {
            assert!(
                response.channel_norm(c) >= values.channel_norm(c),
                "channel {} norm decreased",
                c,
            );
        }
        assert!(response.max_value() > 0.5, "failed to detect atoms");
    }

    #[test]
    fn peak_cap_bounds_every_value() {
        let grid = rendered_grid();
        let kernel = Kernel::build(0.5, grid.typer().as_ref()).unwrap();
        let response = convolve(&grid.elem_values(), &kernel);
        let capped = apply_peak_value(&response, 1.5);
        assert!(capped.values().iter().all(|&v| v <= 1.5));
    }

    #[test]
    fn sorted_points_are_non_increasing_and_index_back_exactly() {
        let grid = rendered_grid();
        let values = grid.elem_values();
        let points = sort_grid_points(&values);
        assert_eq!(points.len(), 3 * 15 * 15 * 15);
        for pair in points.windows(2) {
            assert!(pair[0].value >= pair[1].value, "values not sorted");
        }
        for p in points.iter().take(500) {
            assert_eq!(
                values.get(p.channel, p.voxel[0], p.voxel[1], p.voxel[2]),
                p.value,
                "values not unsorted",
            );
        }
    }

    #[test]
    fn threshold_keeps_only_strictly_greater_values() {
        let grid = rendered_grid();
        let points = sort_grid_points(&grid.elem_values());
        let survivors = apply_threshold(points, 0.1);
        assert!(!survivors.is_empty());
        assert!(survivors.iter().all(|p| p.value > 0.1));
    }

    #[test]
    fn suppression_variants_agree_exactly_in_both_scopes() {
        let grid = rendered_grid();
        let points = apply_threshold(sort_grid_points(&grid.elem_values()), 0.1);
        let coords: Vec<Point3<f64>> = points
            .iter()
            .map(|p| grid.voxel_center(p.voxel[0], p.voxel[1], p.voxel[2]))
            .collect();

        for scope in [SuppressionScope::SameChannel, SuppressionScope::AllChannels] {
            for min_dist in [0.0, 0.5, 1.0, 2.0] {
                let matrix = suppress_matrix(&points, &coords, min_dist, scope);
                let scan = suppress_scan(&points, &coords, min_dist, scope);
                assert_eq!(matrix, scan, "scope {:?} min_dist {}", scope, min_dist);
                assert!(matrix.len() <= points.len());
                let matrix_channels: Vec<usize> =
                    matrix.iter().map(|&i| points[i].channel).collect();
                let scan_channels: Vec<usize> = scan.iter().map(|&i| points[i].channel).collect();
                assert_eq!(matrix_channels, scan_channels);
            }
        }
    }

    #[test]
    fn suppression_with_spacing_keeps_one_candidate_per_peak() {
        let grid = rendered_grid();
        let points = apply_threshold(sort_grid_points(&grid.elem_values()), 0.3);
        let coords: Vec<Point3<f64>> = points
            .iter()
            .map(|p| grid.voxel_center(p.voxel[0], p.voxel[1], p.voxel[2]))
            .collect();
        let accepted = suppress_non_max(&points, &coords, 1.0, SuppressionScope::SameChannel);
        // one peak per element channel survives a 1.0-unit exclusion zone
        assert_eq!(accepted.len(), 3);
        let mut channels: Vec<usize> = accepted.iter().map(|&i| points[i].channel).collect();
        channels.sort_unstable();
        assert_eq!(channels, vec![0, 1, 2]);
    }

    #[test]
    fn detect_atoms_recovers_the_rendered_peaks() {
        let grid = rendered_grid();
        let mut detector = PeakDetector::new(DetectionConfig {
            threshold: 0.3,
            min_dist: 1.0,
            ..config()
        });
        let (coords, types) = detector.detect_atoms(&grid).unwrap();
        assert_eq!(coords.len(), 3);
        assert_eq!(types.len(), 3);
        assert!(types.iter().all(|t| t.len() == 3));
        // every candidate sits on a voxel center within half a voxel of an atom
        let truth = [
            Point3::new(-1.5, 0.0, 0.0),
            Point3::new(1.5, 0.0, 0.0),
            Point3::new(0.0, 1.5, 0.5),
        ];
        for c in &coords {
            assert!(truth.iter().any(|t| (c - t).norm() < 0.5));
        }
    }

    #[test]
    fn detection_cap_keeps_exactly_the_highest_scoring_candidates() {
        let grid = rendered_grid();
        let mut uncapped = PeakDetector::new(DetectionConfig {
            threshold: 0.3,
            min_dist: 1.0,
            ..config()
        });
        let all = uncapped.detect_candidates(&grid, &grid.elem_values()).unwrap();
        assert!(all.len() >= 2);

        let mut capped = PeakDetector::new(DetectionConfig {
            threshold: 0.3,
            min_dist: 1.0,
            n_atoms_detect: Some(2),
            ..config()
        });
        let (coords, types) = capped.detect_atoms(&grid).unwrap();
        assert_eq!(coords.len(), 2);
        assert_eq!(types.len(), 2);
        assert_eq!(coords[0], all[0].coord);
        assert_eq!(coords[1], all[1].coord);
    }

    #[test]
    fn empty_grid_yields_zero_candidates_without_error() {
        let typer = typer();
        let grid = AtomGrid::new(GridTensor::zeros(3, 9), 0.5, Point3::origin(), typer).unwrap();
        let mut detector = PeakDetector::new(config());
        let (coords, types) = detector.detect_atoms(&grid).unwrap();
        assert!(coords.is_empty());
        assert!(types.is_empty());
    }

    #[test]
    fn kernel_is_built_once_and_reused() {
        let grid = rendered_grid();
        let mut detector = PeakDetector::new(DetectionConfig {
            apply_conv: true,
            ..config()
        });
        let _ = detector.detect_atoms(&grid).unwrap();
        let first = detector.kernel.clone().unwrap();
        let _ = detector.detect_atoms(&grid).unwrap();
        assert_eq!(detector.kernel.as_ref().unwrap(), &first);
    }

    #[test]
    fn determinism_identical_inputs_produce_identical_candidates() {
        let grid = rendered_grid();
        let mut a = PeakDetector::new(DetectionConfig {
            apply_conv: true,
            min_dist: 1.0,
            ..config()
        });
        let mut b = PeakDetector::new(DetectionConfig {
            apply_conv: true,
            min_dist: 1.0,
            ..config()
        });
        let ca = a.detect_candidates(&grid, &grid.elem_values()).unwrap();
        let cb = b.detect_candidates(&grid, &grid.elem_values()).unwrap();
        assert_eq!(ca, cb);
    }
}
