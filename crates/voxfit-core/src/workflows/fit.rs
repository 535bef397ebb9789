use crate::core::grid::AtomGrid;
use crate::core::structs::AtomStructData;
use crate::engine::config::FitConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::ProgressReporter;
use crate::engine::search::{FitState, FittingSearch};
use tracing::{info, instrument};

/// The outcome of a complete fitting run.
#[derive(Debug)]
pub struct FitResult {
    /// The final struct, carrying its loss in metadata.
    pub structure: AtomStructData,
    /// The final struct rendered on the target's geometry.
    pub rendered: AtomGrid,
    /// Every evaluated hypothesis in evaluation order; the final state is the
    /// last entry and scores no worse than any other. Diagnostic only.
    pub visited: Vec<FitState>,
    /// Reconstruction loss of `structure` against the target grid.
    pub loss: f64,
}

/// Fits a discrete atom set to `grid`.
///
/// Runs single-shot peak detection, the greedy add/remove search with
/// intermediate refinement, and a final refinement pass on the accepted
/// struct. An empty grid produces an empty struct, not an error.
#[instrument(skip_all, name = "fit_workflow")]
pub fn run(
    grid: &AtomGrid,
    config: &FitConfig,
    reporter: &ProgressReporter,
) -> Result<FitResult, EngineError> {
    info!(
        size = grid.size(),
        resolution = grid.resolution(),
        channels = grid.values().channels(),
        "starting grid fit"
    );

    let outcome = FittingSearch::new(grid, config).run(reporter)?;
    let FitState {
        structure,
        rendered,
        loss,
    } = outcome.final_state;

    info!(atoms = structure.len(), loss, "grid fit complete");
    Ok(FitResult {
        structure,
        rendered: grid.new_like(rendered),
        visited: outcome.visited,
        loss,
    })
}
