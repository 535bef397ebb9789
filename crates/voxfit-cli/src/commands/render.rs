use super::{load_typer, render_input_grid};
use crate::cli::RenderArgs;
use crate::config::FileConfig;
use crate::error::Result;
use crate::input;
use tracing::info;

pub fn run(args: RenderArgs) -> Result<()> {
    let file_config = FileConfig::load_or_default(args.config.as_deref())?;
    let typer = load_typer(args.typer.as_deref(), &file_config)?;
    let atoms = input::read_atoms(&args.input)?;
    let resolution = args.resolution.unwrap_or(file_config.grid.resolution);
    let dimension = args.dimension.unwrap_or(file_config.grid.dimension);

    let (grid, _) = render_input_grid(&atoms, typer, resolution, dimension)?;
    input::write_grid(&args.output, &grid, args.min_value)?;

    info!(
        atoms = atoms.len(),
        size = grid.size(),
        output = %args.output.display(),
        "grid rendered"
    );
    println!(
        "Rendered {} atoms onto a {}^3 grid -> {}",
        atoms.len(),
        grid.size(),
        args.output.display(),
    );
    Ok(())
}
