pub mod fit;
pub mod render;

use crate::config::FileConfig;
use crate::error::{CliError, Result};
use crate::input::AtomRecord;
use nalgebra::{Point3, Vector3};
use std::path::Path;
use std::sync::Arc;
use voxfit::core::grid::{AtomGrid, size_for_dimension};
use voxfit::core::render::GridRenderer;
use voxfit::core::typing::{AtomTyper, ElementTyper};

/// The typing scheme from the CLI flag, the config file, or the built-in
/// default, in that order of precedence.
pub(crate) fn load_typer(
    cli_path: Option<&Path>,
    config: &FileConfig,
) -> Result<Arc<dyn AtomTyper>> {
    let path = cli_path.or(config.typer.path.as_deref());
    match path {
        Some(path) => Ok(Arc::new(ElementTyper::load(path)?)),
        None => Ok(Arc::new(ElementTyper::default())),
    }
}

/// Renders an atom table onto a grid centered on the table's centroid.
pub(crate) fn render_input_grid(
    atoms: &[AtomRecord],
    typer: Arc<dyn AtomTyper>,
    resolution: f64,
    dimension: f64,
) -> Result<(AtomGrid, Vec<Point3<f64>>)> {
    if atoms.is_empty() {
        return Err(CliError::Input("atom table is empty".to_string()));
    }
    if resolution <= 0.0 {
        return Err(CliError::Input(format!(
            "resolution must be positive, got {}",
            resolution,
        )));
    }

    let mut coords = Vec::with_capacity(atoms.len());
    let mut types = Vec::with_capacity(atoms.len());
    let mut radii = Vec::with_capacity(atoms.len());
    for atom in atoms {
        let elem = typer.elem_index(&atom.element).ok_or_else(|| {
            CliError::Input(format!(
                "element '{}' is not part of the typing scheme",
                atom.element,
            ))
        })?;
        coords.push(Point3::new(atom.x, atom.y, atom.z));
        types.push(typer.type_vector(elem));
        radii.push(typer.elem_radius(elem));
    }

    let centroid_sum: Vector3<f64> = coords.iter().map(|p| p.coords).sum();
    let center = Point3::from(centroid_sum / coords.len() as f64);

    let size = size_for_dimension(dimension, resolution);
    let renderer = GridRenderer::new(resolution, size, center);
    let values = renderer.render(&coords, &types, &radii, typer.n_channels());
    let grid = AtomGrid::new(values, resolution, center, typer)?;
    Ok((grid, coords))
}
