//! The differentiable forward model: structure → density grid.
//!
//! Each atom deposits a radially symmetric footprint into every channel its
//! type vector weights: a Gaussian out to the atomic radius, continued by the
//! matched quadratic tail, truncated at 1.5 radii. The footprint is C¹
//! everywhere, so the reconstruction loss has an analytic coordinate gradient
//! and no autodiff machinery is needed.

use crate::core::grid::AtomGrid;
use crate::core::grid::tensor::GridTensor;
use nalgebra::{Point3, Vector3};
use std::f64::consts::E;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Density of a unit atom of radius `r` at distance `d` from its center.
///
/// `exp(-2d²/r²)` for `d < r`; the quadratic with matching value and slope on
/// `[r, 1.5r)`; zero beyond. The value at `d = 0` is exactly 1.
pub fn density(d: f64, r: f64) -> f64 {
    let e2 = E * E;
    if d < r {
        (-2.0 * d * d / (r * r)).exp()
    } else if d < 1.5 * r {
        4.0 * d * d / (e2 * r * r) - 12.0 * d / (e2 * r) + 9.0 / e2
    } else {
        0.0
    }
}

/// Derivative of [`density`] with respect to `d`.
pub fn density_slope(d: f64, r: f64) -> f64 {
    let e2 = E * E;
    if d < r {
        (-2.0 * d * d / (r * r)).exp() * (-4.0 * d / (r * r))
    } else if d < 1.5 * r {
        8.0 * d / (e2 * r * r) - 12.0 / (e2 * r)
    } else {
        0.0
    }
}

/// Distance beyond which an atom of radius `r` contributes nothing.
#[inline]
pub fn footprint_cutoff(r: f64) -> f64 {
    1.5 * r
}

/// Renders atom sets onto a fixed grid geometry.
#[derive(Debug, Clone)]
pub struct GridRenderer {
    resolution: f64,
    size: usize,
    center: Point3<f64>,
}

impl GridRenderer {
    pub fn new(resolution: f64, size: usize, center: Point3<f64>) -> Self {
        assert!(resolution > 0.0, "renderer resolution must be positive");
        assert!(size > 0, "renderer size must be positive");
        Self {
            resolution,
            size,
            center,
        }
    }

    /// A renderer matching a grid's geometry exactly.
    pub fn for_grid(grid: &AtomGrid) -> Self {
        Self::new(grid.resolution(), grid.size(), grid.center())
    }

    fn origin(&self) -> Point3<f64> {
        let half_span = (self.size - 1) as f64 / 2.0 * self.resolution;
        self.center - Vector3::repeat(half_span)
    }

    /// Inclusive voxel index range touched by a footprint, per axis.
    fn voxel_range(&self, coord: f64, origin: f64, cutoff: f64) -> Option<(usize, usize)> {
        let lo = ((coord - cutoff - origin) / self.resolution).ceil() as i64;
        let hi = ((coord + cutoff - origin) / self.resolution).floor() as i64;
        let lo = lo.max(0);
        let hi = hi.min(self.size as i64 - 1);
        if lo > hi {
            None
        } else {
            Some((lo as usize, hi as usize))
        }
    }

    /// Renders the structure into a fresh `(n_channels, size³)` tensor.
    ///
    /// `types[a][c]` weights atom `a`'s footprint in channel `c`. Lengths of
    /// `coords`, `types`, and `radii` must agree, and every type vector must
    /// have width `n_channels`; mismatches are programming errors.
    pub fn render(
        &self,
        coords: &[Point3<f64>],
        types: &[Vec<f64>],
        radii: &[f64],
        n_channels: usize,
    ) -> GridTensor {
        assert_eq!(coords.len(), types.len(), "coords/types length mismatch");
        assert_eq!(coords.len(), radii.len(), "coords/radii length mismatch");
        for t in types {
            assert_eq!(t.len(), n_channels, "type vector width mismatch");
        }

        let mut out = GridTensor::zeros(n_channels, self.size);
        let per = out.voxels_per_channel();

        let fill = |(c, buf): (usize, &mut [f64])| {
            self.render_channel(c, buf, coords, types, radii);
        };

        #[cfg(feature = "parallel")]
        out.values_mut().par_chunks_mut(per).enumerate().for_each(fill);

        #[cfg(not(feature = "parallel"))]
        out.values_mut().chunks_mut(per).enumerate().for_each(fill);

        out
    }

    fn render_channel(
        &self,
        c: usize,
        buf: &mut [f64],
        coords: &[Point3<f64>],
        types: &[Vec<f64>],
        radii: &[f64],
    ) {
        let origin = self.origin();
        let n = self.size;
        for ((p, t), &r) in coords.iter().zip(types).zip(radii) {
            let weight = t[c];
            if weight == 0.0 {
                continue;
            }
            let cutoff = footprint_cutoff(r);
            let Some((x0, x1)) = self.voxel_range(p.x, origin.x, cutoff) else {
                continue;
            };
            let Some((y0, y1)) = self.voxel_range(p.y, origin.y, cutoff) else {
                continue;
            };
            let Some((z0, z1)) = self.voxel_range(p.z, origin.z, cutoff) else {
                continue;
            };
            for x in x0..=x1 {
                let dx = p.x - (origin.x + x as f64 * self.resolution);
                for y in y0..=y1 {
                    let dy = p.y - (origin.y + y as f64 * self.resolution);
                    for z in z0..=z1 {
                        let dz = p.z - (origin.z + z as f64 * self.resolution);
                        let d = (dx * dx + dy * dy + dz * dz).sqrt();
                        if d < cutoff {
                            buf[(x * n + y) * n + z] += weight * density(d, r);
                        }
                    }
                }
            }
        }
    }

    /// Reconstruction loss against `target`, the rendered grid, and the loss
    /// gradient with respect to every atom coordinate.
    ///
    /// Loss is the summed squared voxel difference over all channels.
    pub fn loss_and_gradient(
        &self,
        coords: &[Point3<f64>],
        types: &[Vec<f64>],
        radii: &[f64],
        target: &GridTensor,
    ) -> (f64, GridTensor, Vec<Vector3<f64>>) {
        assert_eq!(target.size(), self.size, "target size mismatch");
        let rendered = self.render(coords, types, radii, target.channels());
        let diff = rendered.difference(target);
        let loss = diff.values().iter().map(|v| v * v).sum();

        let grad_of = |a: usize| self.coord_gradient(coords[a], &types[a], radii[a], &diff);

        #[cfg(feature = "parallel")]
        let gradients = (0..coords.len()).into_par_iter().map(grad_of).collect();

        #[cfg(not(feature = "parallel"))]
        let gradients = (0..coords.len()).map(grad_of).collect();

        (loss, rendered, gradients)
    }

    fn coord_gradient(
        &self,
        p: Point3<f64>,
        type_vec: &[f64],
        r: f64,
        diff: &GridTensor,
    ) -> Vector3<f64> {
        let origin = self.origin();
        let cutoff = footprint_cutoff(r);
        let mut grad = Vector3::zeros();
        let (Some((x0, x1)), Some((y0, y1)), Some((z0, z1))) = (
            self.voxel_range(p.x, origin.x, cutoff),
            self.voxel_range(p.y, origin.y, cutoff),
            self.voxel_range(p.z, origin.z, cutoff),
        ) else {
            return grad;
        };
        for x in x0..=x1 {
            let dx = p.x - (origin.x + x as f64 * self.resolution);
            for y in y0..=y1 {
                let dy = p.y - (origin.y + y as f64 * self.resolution);
                for z in z0..=z1 {
                    let dz = p.z - (origin.z + z as f64 * self.resolution);
                    let d = (dx * dx + dy * dy + dz * dz).sqrt();
                    if d >= cutoff || d < 1e-12 {
                        continue;
                    }
                    let slope = density_slope(d, r);
                    let mut coeff = 0.0;
                    for (c, &w) in type_vec.iter().enumerate() {
                        if w != 0.0 {
                            coeff += w * diff.get(c, x, y, z);
                        }
                    }
                    // d(loss)/dp = Σ 2·diff·w·f'(d)·(p − v)/d
                    let scale = 2.0 * coeff * slope / d;
                    grad += Vector3::new(dx, dy, dz) * scale;
                }
            }
        }
        grad
    }
}
