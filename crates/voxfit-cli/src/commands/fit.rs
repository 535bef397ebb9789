use super::{load_typer, render_input_grid};
use crate::cli::FitArgs;
use crate::config::FileConfig;
use crate::error::{CliError, Result};
use crate::input::{self, AtomRecord};
use crate::utils::progress::CliProgressHandler;
use tracing::{debug, info};
use voxfit::core::structs::{INFO_SOURCE, MetaValue};
use voxfit::core::typing::AtomTyper;
use voxfit::core::utils::geometry::calculate_assignment_rmsd;
use voxfit::engine::progress::ProgressReporter;
use voxfit::workflows::fit;

pub fn run(args: FitArgs, quiet: bool) -> Result<()> {
    let mut file_config = FileConfig::load_or_default(args.config.as_deref())?;

    // CLI flags override the file, then the merged result is validated once
    if let Some(v) = args.threshold {
        file_config.detection.threshold = Some(v);
    }
    if let Some(v) = args.min_dist {
        file_config.detection.min_dist = Some(v);
    }
    if let Some(v) = args.n_atoms {
        file_config.detection.n_atoms_detect = Some(v);
    }
    if args.no_growth {
        file_config.search.grow = Some(false);
    }
    if args.no_pruning {
        file_config.search.prune = Some(false);
    }
    if let Some(v) = args.max_iterations {
        file_config.search.max_iterations = Some(v);
    }
    let fit_config = file_config.to_fit_config()?;

    let typer = load_typer(args.typer.as_deref(), &file_config)?;
    let atoms = input::read_atoms(&args.input)?;
    let resolution = args.resolution.unwrap_or(file_config.grid.resolution);
    let dimension = args.dimension.unwrap_or(file_config.grid.dimension);
    info!(
        input = %args.input.display(),
        atoms = atoms.len(),
        resolution,
        dimension,
        "rendering target grid"
    );
    let (grid, source_coords) = render_input_grid(&atoms, typer.clone(), resolution, dimension)?;
    debug!(size = grid.size(), channels = grid.values().channels(), "target grid ready");

    let handler = CliProgressHandler::new();
    let reporter = if quiet {
        ProgressReporter::new()
    } else {
        ProgressReporter::with_callback(handler.get_callback())
    };
    let mut result = fit::run(&grid, &fit_config, &reporter)?;
    result.structure.set_info(
        INFO_SOURCE,
        MetaValue::Text(args.input.display().to_string()),
    );

    let records: Vec<AtomRecord> = result
        .structure
        .coords()
        .iter()
        .zip(result.structure.types())
        .map(|(coord, type_vec)| {
            let elem = typer.elem_of_type_vector(type_vec).ok_or_else(|| {
                CliError::Input("fitted atom has no element channel".to_string())
            })?;
            Ok(AtomRecord {
                element: typer.elem_symbol(elem).to_string(),
                x: coord.x,
                y: coord.y,
                z: coord.z,
            })
        })
        .collect::<Result<_>>()?;
    input::write_atoms(&args.output, &records)?;

    info!(
        atoms = result.structure.len(),
        loss = result.loss,
        visited = result.visited.len(),
        output = %args.output.display(),
        "fit finished"
    );
    println!(
        "Fitted {} atoms (loss {:.4}) -> {}",
        result.structure.len(),
        result.loss,
        args.output.display(),
    );
    if let Some(rmsd) = calculate_assignment_rmsd(result.structure.coords(), &source_coords) {
        println!("Assignment RMSD vs. input atoms: {:.3}", rmsd);
    } else {
        println!(
            "Atom count changed ({} -> {}); no RMSD comparison.",
            source_coords.len(),
            result.structure.len(),
        );
    }
    Ok(())
}
