//! The greedy fitting search: alternate structural moves with refinement.
//!
//! The search owns a single current-best [`FitState`] and an append-only
//! visited history. Each iteration proposes at most one add neighbor (from
//! the residual grid) and one remove neighbor (the weakest-contributing
//! atom), refines both, and accepts the lowest-loss neighbor only on strict
//! improvement. History entries are recorded in evaluation order; the final
//! re-refined struct is always the last entry and never scores worse than
//! any of them.

use super::config::{FitConfig, MoveOrder};
use super::detection::PeakDetector;
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use super::refine::Refiner;
use crate::core::grid::AtomGrid;
use crate::core::grid::tensor::GridTensor;
use crate::core::render::GridRenderer;
use crate::core::structs::{AtomStructData, INFO_LOSS, MetaValue};
use crate::core::typing::AtomTyper;
use std::collections::HashSet;
use tracing::{debug, info};

/// A scored hypothesis: the struct, its rendering, and its loss.
#[derive(Debug, Clone)]
pub struct FitState {
    pub structure: AtomStructData,
    pub rendered: GridTensor,
    pub loss: f64,
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub final_state: FitState,
    /// Every evaluated hypothesis in evaluation order, final state last.
    pub visited: Vec<FitState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchMove {
    Add,
    Remove,
}

pub struct FittingSearch<'a> {
    target: &'a AtomGrid,
    config: &'a FitConfig,
    detector: PeakDetector,
    refiner: Refiner,
    renderer: GridRenderer,
    /// (channel, voxel) add-move locations already attempted.
    tried: HashSet<(usize, [usize; 3])>,
}

impl<'a> FittingSearch<'a> {
    pub fn new(target: &'a AtomGrid, config: &'a FitConfig) -> Self {
        Self {
            target,
            config,
            detector: PeakDetector::new(config.detection.clone()),
            refiner: Refiner::new(&config.refinement),
            renderer: GridRenderer::for_grid(target),
            tried: HashSet::new(),
        }
    }

    pub fn run(&mut self, reporter: &ProgressReporter) -> Result<SearchOutcome, EngineError> {
        let mut visited: Vec<FitState> = Vec::new();

        // === Phase 1: initial hypothesis from single-shot detection ===
        reporter.report(Progress::PhaseStart {
            name: "Peak Detection",
        });
        let (coords, types) = self.detector.detect_atoms(self.target)?;
        let initial = if coords.is_empty() {
            AtomStructData::empty()
        } else {
            AtomStructData::new(coords, types, self.target.typer().as_ref())
        };
        info!(atoms = initial.len(), "initial detection complete");
        reporter.report(Progress::PhaseFinish);

        reporter.report(Progress::PhaseStart {
            name: "Iterative Search",
        });
        let mut best = self.evaluate(initial, self.config.refinement.interm_steps);
        visited.push(best.clone());

        // === Phase 2: greedy add/remove loop ===
        for iteration in 0..self.config.search.max_iterations {
            let moves = match self.config.search.move_order {
                MoveOrder::AddThenRemove => [SearchMove::Add, SearchMove::Remove],
                MoveOrder::RemoveThenAdd => [SearchMove::Remove, SearchMove::Add],
            };

            let mut neighbors: Vec<FitState> = Vec::new();
            for mv in moves {
                let proposal = match mv {
                    SearchMove::Add => self.grow_neighbor(&best)?,
                    SearchMove::Remove => self.prune_neighbor(&best),
                };
                if let Some(structure) = proposal {
                    let state = self.evaluate(structure, self.config.refinement.interm_steps);
                    visited.push(state.clone());
                    neighbors.push(state);
                }
            }

            let challenger = neighbors.into_iter().reduce(|a, b| {
                // strict comparison keeps the earlier-evaluated state on ties
                if b.loss < a.loss { b } else { a }
            });

            match challenger {
                Some(state) if state.loss < best.loss => {
                    debug!(
                        iteration,
                        atoms = state.structure.len(),
                        loss = state.loss,
                        "accepted improving neighbor"
                    );
                    reporter.report(Progress::StatusUpdate {
                        text: format!(
                            "Pass {}/{}, atoms: {}, loss: {:.4}",
                            iteration + 1,
                            self.config.search.max_iterations,
                            state.structure.len(),
                            state.loss,
                        ),
                    });
                    best = state;
                }
                _ => {
                    info!(iteration, "no improving neighbor; search done");
                    break;
                }
            }
        }
        reporter.report(Progress::PhaseFinish);

        // === Phase 3: final refinement of the accepted struct ===
        reporter.report(Progress::PhaseStart {
            name: "Final Refinement",
        });
        let final_state = self.evaluate(
            best.structure.clone(),
            self.config.refinement.final_steps,
        );
        visited.push(final_state.clone());
        info!(
            atoms = final_state.structure.len(),
            loss = final_state.loss,
            visited = visited.len(),
            "fitting search finished"
        );
        reporter.report(Progress::PhaseFinish);

        debug_assert!(visited.iter().all(|s| s.loss >= final_state.loss));
        Ok(SearchOutcome {
            final_state,
            visited,
        })
    }

    /// Refines a hypothesis and scores it against the target.
    fn evaluate(&self, structure: AtomStructData, steps: usize) -> FitState {
        let outcome = self.refiner.refine(
            &self.renderer,
            structure.coords(),
            structure.types(),
            structure.radii(),
            self.target.values(),
            steps,
        );
        let mut refined = structure.with_coords(outcome.coords);
        refined.set_info(INFO_LOSS, MetaValue::Float(outcome.loss));
        FitState {
            structure: refined,
            rendered: outcome.rendered,
            loss: outcome.loss,
        }
    }

    /// Add-one-atom neighbor: the highest-response untried location on the
    /// residual grid, or `None` when growth is disabled, the atom cap is
    /// reached, or no untried candidate remains.
    fn grow_neighbor(&mut self, best: &FitState) -> Result<Option<AtomStructData>, EngineError> {
        if !self.config.search.grow || best.structure.len() >= self.config.search.max_atoms {
            return Ok(None);
        }
        let residual = self.target.values().difference(&best.rendered);
        let elem_residual = residual.leading_channels(self.target.typer().n_elem_types());
        let candidates = self.detector.detect_candidates(self.target, &elem_residual)?;

        let next = candidates
            .into_iter()
            .find(|c| !self.tried.contains(&(c.channel, c.voxel)));
        Ok(next.map(|c| {
            self.tried.insert((c.channel, c.voxel));
            let typer = self.target.typer();
            best.structure
                .with_atom(c.coord, typer.type_vector(c.channel), typer.as_ref())
        }))
    }

    /// Remove-one-atom neighbor: drops the atom whose absence yields the
    /// lowest unrefined loss (low index wins ties), or `None` when pruning is
    /// disabled or the struct is empty.
    fn prune_neighbor(&self, best: &FitState) -> Option<AtomStructData> {
        if !self.config.search.prune || best.structure.is_empty() {
            return None;
        }
        let n_channels = self.target.values().channels();
        let mut weakest: Option<(usize, f64)> = None;
        for i in 0..best.structure.len() {
            let candidate = best.structure.without_atom(i);
            let rendered = self.renderer.render(
                candidate.coords(),
                candidate.types(),
                candidate.radii(),
                n_channels,
            );
            let loss = rendered.squared_error(self.target.values());
            if weakest.is_none_or(|(_, w)| loss < w) {
                weakest = Some((i, loss));
            }
        }
        weakest.map(|(i, _)| best.structure.without_atom(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::typing::{AtomTyper, ElementTyper};
    use crate::engine::config::FitConfigBuilder;
    use nalgebra::Point3;
    use std::sync::Arc;

    fn target_grid(coords: &[Point3<f64>], elems: &[usize]) -> AtomGrid {
        let typer = Arc::new(ElementTyper::from_symbols(&["C", "N", "O"]).unwrap());
        let renderer = GridRenderer::new(0.5, 15, Point3::origin());
        let types: Vec<Vec<f64>> = elems.iter().map(|&e| typer.type_vector(e)).collect();
        let radii: Vec<f64> = elems.iter().map(|&e| typer.elem_radius(e)).collect();
        let values = renderer.render(coords, &types, &radii, 3);
        AtomGrid::new(values, 0.5, Point3::origin(), typer).unwrap()
    }

    fn search_config() -> FitConfig {
        FitConfigBuilder::new()
            .apply_conv(false)
            .threshold(0.3)
            .min_dist(1.0)
            .interm_steps(10)
            .final_steps(50)
            .max_iterations(10)
            .build()
            .unwrap()
    }

    #[test]
    fn search_satisfies_the_history_post_conditions() {
        let grid = target_grid(
            &[Point3::new(-1.5, 0.0, 0.0), Point3::new(1.5, 0.5, 0.0)],
            &[0, 2],
        );
        let config = search_config();
        let outcome = FittingSearch::new(&grid, &config)
            .run(&ProgressReporter::new())
            .unwrap();

        assert!(!outcome.visited.is_empty());
        for state in &outcome.visited {
            assert!(state.loss >= outcome.final_state.loss);
        }
        let last = outcome.visited.last().unwrap();
        assert_eq!(last.loss, outcome.final_state.loss);
        assert_eq!(
            last.structure.coords(),
            outcome.final_state.structure.coords()
        );
    }

    #[test]
    fn visited_structs_carry_their_loss_in_metadata() {
        let grid = target_grid(&[Point3::new(0.0, 0.0, 0.0)], &[1]);
        let config = search_config();
        let outcome = FittingSearch::new(&grid, &config)
            .run(&ProgressReporter::new())
            .unwrap();
        for state in &outcome.visited {
            assert_eq!(state.structure.loss(), Some(state.loss));
        }
    }

    #[test]
    fn growth_recovers_an_atom_hidden_from_initial_detection() {
        // cap initial detection to a single atom; growth must find the other
        let grid = target_grid(
            &[Point3::new(-1.5, 0.0, 0.0), Point3::new(1.5, 0.0, 0.0)],
            &[0, 0],
        );
        let config = FitConfigBuilder::new()
            .apply_conv(false)
            .threshold(0.3)
            .min_dist(1.0)
            .n_atoms_detect(Some(1))
            .interm_steps(10)
            .final_steps(50)
            .max_iterations(10)
            .build()
            .unwrap();
        let outcome = FittingSearch::new(&grid, &config)
            .run(&ProgressReporter::new())
            .unwrap();
        assert_eq!(outcome.final_state.structure.len(), 2);
    }

    #[test]
    fn pruning_discards_a_spurious_extra_atom() {
        let grid = target_grid(&[Point3::new(0.0, 0.0, 0.0)], &[0]);
        // a permissive threshold and tight spacing flood the initial detection
        let config = FitConfigBuilder::new()
            .apply_conv(false)
            .threshold(0.2)
            .min_dist(0.4)
            .grow(false)
            .interm_steps(10)
            .final_steps(50)
            .max_iterations(20)
            .build()
            .unwrap();
        let outcome = FittingSearch::new(&grid, &config)
            .run(&ProgressReporter::new())
            .unwrap();
        assert_eq!(outcome.final_state.structure.len(), 1);
    }

    #[test]
    fn empty_target_terminates_with_an_empty_struct() {
        let typer: Arc<dyn AtomTyper> =
            Arc::new(ElementTyper::from_symbols(&["C", "N", "O"]).unwrap());
        let grid = AtomGrid::new(
            GridTensor::zeros(3, 9),
            0.5,
            Point3::origin(),
            typer,
        )
        .unwrap();
        let config = search_config();
        let outcome = FittingSearch::new(&grid, &config)
            .run(&ProgressReporter::new())
            .unwrap();
        assert!(outcome.final_state.structure.is_empty());
        assert_eq!(outcome.final_state.loss, 0.0);
        assert_eq!(outcome.visited.len(), 2);
    }

    #[test]
    fn search_is_deterministic_across_runs() {
        let grid = target_grid(
            &[Point3::new(-1.5, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0)],
            &[0, 1],
        );
        let config = search_config();
        let a = FittingSearch::new(&grid, &config)
            .run(&ProgressReporter::new())
            .unwrap();
        let b = FittingSearch::new(&grid, &config)
            .run(&ProgressReporter::new())
            .unwrap();
        assert_eq!(a.final_state.loss, b.final_state.loss);
        assert_eq!(
            a.final_state.structure.coords(),
            b.final_state.structure.coords()
        );
        assert_eq!(a.visited.len(), b.visited.len());
    }
}
