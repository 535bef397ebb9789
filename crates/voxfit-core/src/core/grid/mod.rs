//! Density grids and their geometry.
//!
//! An [`AtomGrid`] couples a dense [`GridTensor`] with the spatial metadata
//! needed to map voxel indices to world coordinates, plus the typing scheme
//! that gives its channels meaning. Grids are immutable once built; derived
//! grids are constructed through [`AtomGrid::new_like`].

pub mod tensor;

use crate::core::typing::AtomTyper;
use nalgebra::{Point3, Vector3};
use std::sync::Arc;
use tensor::GridTensor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("Grid resolution must be positive, got {resolution}")]
    NonPositiveResolution { resolution: f64 },

    #[error("Grid side length must be odd so the center voxel is well-defined, got {size}")]
    EvenSize { size: usize },

    #[error("Grid has {grid_channels} channels but the typing scheme defines {typer_channels}")]
    ChannelMismatch {
        grid_channels: usize,
        typer_channels: usize,
    },
}

/// Geometric metadata of a grid, detached from its values.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDescriptor {
    pub resolution: f64,
    pub size: usize,
    pub center: Point3<f64>,
    pub n_elem_channels: usize,
    pub n_prop_channels: usize,
}

impl GridDescriptor {
    /// Physical side length spanned by the voxel centers.
    pub fn dimension(&self) -> f64 {
        (self.size - 1) as f64 * self.resolution
    }
}

/// Voxel count per side covering a physical dimension at a resolution,
/// forced odd so voxel indices have a well-defined center.
pub fn size_for_dimension(dimension: f64, resolution: f64) -> usize {
    let size = (dimension / resolution).round() as usize + 1;
    if size % 2 == 0 { size + 1 } else { size }
}

/// A dense density grid over a cubic region of space.
#[derive(Debug, Clone)]
pub struct AtomGrid {
    values: GridTensor,
    resolution: f64,
    center: Point3<f64>,
    typer: Arc<dyn AtomTyper>,
}

impl AtomGrid {
    pub fn new(
        values: GridTensor,
        resolution: f64,
        center: Point3<f64>,
        typer: Arc<dyn AtomTyper>,
    ) -> Result<Self, GridError> {
        if resolution <= 0.0 {
            return Err(GridError::NonPositiveResolution { resolution });
        }
        if values.size() % 2 == 0 {
            return Err(GridError::EvenSize {
                size: values.size(),
            });
        }
        if values.channels() != typer.n_channels() {
            return Err(GridError::ChannelMismatch {
                grid_channels: values.channels(),
                typer_channels: typer.n_channels(),
            });
        }
        Ok(Self {
            values,
            resolution,
            center,
            typer,
        })
    }

    /// A grid with identical geometry and typing but new values.
    ///
    /// Panics on shape mismatch; callers derive values from this grid's own
    /// shape, so a mismatch is a programming error.
    pub fn new_like(&self, values: GridTensor) -> AtomGrid {
        assert_eq!(
            (values.channels(), values.size()),
            (self.values.channels(), self.values.size()),
            "derived grid shape differs from source grid",
        );
        AtomGrid {
            values,
            resolution: self.resolution,
            center: self.center,
            typer: Arc::clone(&self.typer),
        }
    }

    #[inline]
    pub fn values(&self) -> &GridTensor {
        &self.values
    }

    #[inline]
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    #[inline]
    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.values.size()
    }

    pub fn typer(&self) -> &Arc<dyn AtomTyper> {
        &self.typer
    }

    pub fn descriptor(&self) -> GridDescriptor {
        GridDescriptor {
            resolution: self.resolution,
            size: self.size(),
            center: self.center,
            n_elem_channels: self.typer.n_elem_types(),
            n_prop_channels: self.typer.n_prop_channels(),
        }
    }

    /// The element channels of this grid as a standalone tensor.
    pub fn elem_values(&self) -> GridTensor {
        self.values.leading_channels(self.typer.n_elem_types())
    }

    /// World coordinate of the voxel with the lowest indices.
    pub fn origin(&self) -> Point3<f64> {
        let half_span = (self.size() - 1) as f64 / 2.0 * self.resolution;
        self.center - Vector3::repeat(half_span)
    }

    /// World coordinate of a voxel center.
    pub fn voxel_center(&self, x: usize, y: usize, z: usize) -> Point3<f64> {
        let origin = self.origin();
        origin
            + Vector3::new(
                x as f64 * self.resolution,
                y as f64 * self.resolution,
                z as f64 * self.resolution,
            )
    }
}
