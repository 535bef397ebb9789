use crate::core::grid::tensor::GridTensor;
use crate::core::render::{density, footprint_cutoff};
use crate::core::typing::AtomTyper;
use itertools::iproduct;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Kernel resolution must be positive, got {resolution}")]
    NonPositiveResolution { resolution: f64 },

    #[error("Channel '{symbol}' has non-positive radius {radius}; cannot build a detection kernel")]
    NonPositiveRadius { symbol: String, radius: f64 },

    #[error("Implied kernel size {size} for channel '{symbol}' is not a positive odd number")]
    InvalidSize { symbol: String, size: i64 },
}

/// Per-element-channel matched filter: a small cube holding the grid footprint
/// of one atom of that channel's radius.
///
/// Invariants: the side length is odd, values are symmetric under reflection
/// through the center along each axis, and the center voxel of every channel
/// is exactly 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    values: GridTensor,
}

impl Kernel {
    /// Builds the filter for every element channel of the typing scheme.
    ///
    /// Each channel's implied side is `2·round(r/resolution) + 1` voxels; the
    /// cube is sized by the largest channel. Degenerate configurations
    /// (non-positive resolution or radius, an invalid implied size) fail here,
    /// never silently.
    pub fn build(resolution: f64, typer: &dyn AtomTyper) -> Result<Self, KernelError> {
        if resolution <= 0.0 {
            return Err(KernelError::NonPositiveResolution { resolution });
        }

        let n_channels = typer.n_elem_types();
        let mut size = 0usize;
        for c in 0..n_channels {
            let radius = typer.elem_radius(c);
            if radius <= 0.0 {
                return Err(KernelError::NonPositiveRadius {
                    symbol: typer.elem_symbol(c).to_string(),
                    radius,
                });
            }
            let implied = 2 * (radius / resolution).round() as i64 + 1;
            if implied <= 0 || implied % 2 == 0 {
                return Err(KernelError::InvalidSize {
                    symbol: typer.elem_symbol(c).to_string(),
                    size: implied,
                });
            }
            size = size.max(implied as usize);
        }

        let mid = (size / 2) as i64;
        let mut values = GridTensor::zeros(n_channels, size);
        for c in 0..n_channels {
            let radius = typer.elem_radius(c);
            let cutoff = footprint_cutoff(radius);
            let center = density(0.0, radius);
            for (i, j, k) in iproduct!(0..size, 0..size, 0..size) {
                let dx = (i as i64 - mid) as f64 * resolution;
                let dy = (j as i64 - mid) as f64 * resolution;
                let dz = (k as i64 - mid) as f64 * resolution;
                let d = (dx * dx + dy * dy + dz * dz).sqrt();
                if d < cutoff {
                    values.set(c, i, j, k, density(d, radius) / center);
                }
            }
        }

        Ok(Self { values })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.values.channels()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.values.size()
    }

    #[inline]
    pub fn get(&self, c: usize, i: usize, j: usize, k: usize) -> f64 {
        self.values.get(c, i, j, k)
    }

    pub fn values(&self) -> &GridTensor {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::typing::ElementTyper;

    #[test]
    fn build_produces_an_odd_cube_covering_every_channel() {
        let typer = ElementTyper::from_symbols(&["C", "N", "O"]).unwrap();
        let kernel = Kernel::build(0.5, &typer).unwrap();
        assert_eq!(kernel.channels(), 3);
        assert_eq!(kernel.size() % 2, 1);
        assert!(kernel.values().norm() > 0.0);
        for c in 0..3 {
            assert!(kernel.values().channel_norm(c) > 0.0, "empty kernel channel");
        }
    }

    #[test]
    fn kernel_center_is_exactly_one_in_every_channel() {
        let typer = ElementTyper::from_symbols(&["C", "O"]).unwrap();
        let kernel = Kernel::build(0.5, &typer).unwrap();
        let m = kernel.size() / 2;
        for c in 0..kernel.channels() {
            assert_eq!(kernel.get(c, m, m, m), 1.0);
        }
    }

    #[test]
    fn kernel_is_symmetric_about_its_center_along_each_axis() {
        let typer = ElementTyper::from_symbols(&["C", "N", "O"]).unwrap();
        let kernel = Kernel::build(0.5, &typer).unwrap();
        let m = kernel.size() / 2;
        for c in 0..kernel.channels() {
            for off in 1..=m {
                assert_eq!(kernel.get(c, m - off, m, m), kernel.get(c, m + off, m, m));
                assert_eq!(kernel.get(c, m, m - off, m), kernel.get(c, m, m + off, m));
                assert_eq!(kernel.get(c, m, m, m - off), kernel.get(c, m, m, m + off));
            }
        }
    }

    #[test]
    fn build_rejects_non_positive_resolution() {
        let typer = ElementTyper::from_symbols(&["C"]).unwrap();
        assert!(matches!(
            Kernel::build(0.0, &typer),
            Err(KernelError::NonPositiveResolution { .. })
        ));
        assert!(matches!(
            Kernel::build(-0.5, &typer),
            Err(KernelError::NonPositiveResolution { .. })
        ));
    }

    #[test]
    fn build_rejects_zero_radius_channels() {
        let typer = ElementTyper::with_radii(&[("C", 0.77), ("X", 0.0)]).unwrap();
        let result = Kernel::build(0.5, &typer);
        assert!(matches!(
            result,
            Err(KernelError::NonPositiveRadius { symbol, .. }) if symbol == "X"
        ));
    }

    #[test]
    fn kernel_size_scales_with_the_largest_radius() {
        let small = ElementTyper::with_radii(&[("C", 0.5)]).unwrap();
        let large = ElementTyper::with_radii(&[("C", 0.5), ("I", 1.33)]).unwrap();
        let k_small = Kernel::build(0.5, &small).unwrap();
        let k_large = Kernel::build(0.5, &large).unwrap();
        assert_eq!(k_small.size(), 3);
        assert_eq!(k_large.size(), 7);
        assert!(k_large.size() > k_small.size());
    }
}
