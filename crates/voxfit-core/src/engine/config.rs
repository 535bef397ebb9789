use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for parameter '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
}

/// Which previously accepted candidates a new candidate is checked against
/// during non-maximum suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionScope {
    /// Only candidates in the same element channel suppress each other.
    SameChannel,
    /// Candidates suppress each other across all channels.
    AllChannels,
}

/// Order in which the fitting search generates neighbor hypotheses within one
/// iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOrder {
    AddThenRemove,
    RemoveThenAdd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Convolve with the matched-filter kernel before ranking voxels.
    pub apply_conv: bool,
    /// Candidates must strictly exceed this response value.
    pub threshold: f64,
    /// Response values are clamped to this maximum before ranking.
    pub peak_value: f64,
    /// Minimum distance a candidate must keep from every accepted candidate
    /// within scope.
    pub min_dist: f64,
    pub suppression_scope: SuppressionScope,
    /// Cap on the number of detected atoms; `None` keeps every survivor.
    pub n_atoms_detect: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinementConfig {
    /// Gradient steps per hypothesis during the search.
    pub interm_steps: usize,
    /// Gradient steps for the accepted struct once the atom count is settled.
    pub final_steps: usize,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Generate add-one-atom neighbors from the residual grid.
    pub grow: bool,
    /// Generate remove-weakest-atom neighbors.
    pub prune: bool,
    pub move_order: MoveOrder,
    /// Hard cap on search iterations.
    pub max_iterations: usize,
    /// Hard cap on hypothesis size.
    pub max_atoms: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    pub detection: DetectionConfig,
    pub refinement: RefinementConfig,
    pub search: SearchConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig {
                apply_conv: true,
                threshold: 0.1,
                peak_value: 1.5,
                min_dist: 0.0,
                suppression_scope: SuppressionScope::SameChannel,
                n_atoms_detect: None,
            },
            refinement: RefinementConfig {
                interm_steps: 10,
                final_steps: 100,
                learning_rate: 0.1,
            },
            search: SearchConfig {
                grow: true,
                prune: true,
                move_order: MoveOrder::AddThenRemove,
                max_iterations: 50,
                max_atoms: 80,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct FitConfigBuilder {
    apply_conv: Option<bool>,
    threshold: Option<f64>,
    peak_value: Option<f64>,
    min_dist: Option<f64>,
    suppression_scope: Option<SuppressionScope>,
    n_atoms_detect: Option<Option<usize>>,
    interm_steps: Option<usize>,
    final_steps: Option<usize>,
    learning_rate: Option<f64>,
    grow: Option<bool>,
    prune: Option<bool>,
    move_order: Option<MoveOrder>,
    max_iterations: Option<usize>,
    max_atoms: Option<usize>,
}

impl FitConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_conv(mut self, apply: bool) -> Self {
        self.apply_conv = Some(apply);
        self
    }
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }
    pub fn peak_value(mut self, peak_value: f64) -> Self {
        self.peak_value = Some(peak_value);
        self
    }
    pub fn min_dist(mut self, min_dist: f64) -> Self {
        self.min_dist = Some(min_dist);
        self
    }
    pub fn suppression_scope(mut self, scope: SuppressionScope) -> Self {
        self.suppression_scope = Some(scope);
        self
    }
    pub fn n_atoms_detect(mut self, n: Option<usize>) -> Self {
        self.n_atoms_detect = Some(n);
        self
    }
    pub fn interm_steps(mut self, steps: usize) -> Self {
        self.interm_steps = Some(steps);
        self
    }
    pub fn final_steps(mut self, steps: usize) -> Self {
        self.final_steps = Some(steps);
        self
    }
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = Some(lr);
        self
    }
    pub fn grow(mut self, grow: bool) -> Self {
        self.grow = Some(grow);
        self
    }
    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = Some(prune);
        self
    }
    pub fn move_order(mut self, order: MoveOrder) -> Self {
        self.move_order = Some(order);
        self
    }
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn max_atoms(mut self, max_atoms: usize) -> Self {
        self.max_atoms = Some(max_atoms);
        self
    }

    pub fn build(self) -> Result<FitConfig, ConfigError> {
        let defaults = FitConfig::default();
        let config = FitConfig {
            detection: DetectionConfig {
                apply_conv: self.apply_conv.unwrap_or(defaults.detection.apply_conv),
                threshold: self.threshold.unwrap_or(defaults.detection.threshold),
                peak_value: self.peak_value.unwrap_or(defaults.detection.peak_value),
                min_dist: self.min_dist.unwrap_or(defaults.detection.min_dist),
                suppression_scope: self
                    .suppression_scope
                    .unwrap_or(defaults.detection.suppression_scope),
                n_atoms_detect: self
                    .n_atoms_detect
                    .unwrap_or(defaults.detection.n_atoms_detect),
            },
            refinement: RefinementConfig {
                interm_steps: self.interm_steps.unwrap_or(defaults.refinement.interm_steps),
                final_steps: self.final_steps.unwrap_or(defaults.refinement.final_steps),
                learning_rate: self
                    .learning_rate
                    .unwrap_or(defaults.refinement.learning_rate),
            },
            search: SearchConfig {
                grow: self.grow.unwrap_or(defaults.search.grow),
                prune: self.prune.unwrap_or(defaults.search.prune),
                move_order: self.move_order.unwrap_or(defaults.search.move_order),
                max_iterations: self
                    .max_iterations
                    .unwrap_or(defaults.search.max_iterations),
                max_atoms: self.max_atoms.unwrap_or(defaults.search.max_atoms),
            },
        };
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &FitConfig) -> Result<(), ConfigError> {
    if !config.detection.threshold.is_finite() {
        return Err(ConfigError::InvalidParameter {
            parameter: "threshold",
            reason: "must be finite".to_string(),
        });
    }
    if !(config.detection.peak_value > 0.0) {
        return Err(ConfigError::InvalidParameter {
            parameter: "peak_value",
            reason: format!("must be positive, got {}", config.detection.peak_value),
        });
    }
    if !(config.detection.min_dist >= 0.0) {
        return Err(ConfigError::InvalidParameter {
            parameter: "min_dist",
            reason: format!("must be non-negative, got {}", config.detection.min_dist),
        });
    }
    if config.detection.n_atoms_detect == Some(0) {
        return Err(ConfigError::InvalidParameter {
            parameter: "n_atoms_detect",
            reason: "a cap of zero atoms makes every fit empty".to_string(),
        });
    }
    if !(config.refinement.learning_rate > 0.0) {
        return Err(ConfigError::InvalidParameter {
            parameter: "learning_rate",
            reason: format!("must be positive, got {}", config.refinement.learning_rate),
        });
    }
    if config.search.max_iterations == 0 {
        return Err(ConfigError::InvalidParameter {
            parameter: "max_iterations",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.search.max_atoms == 0 {
        return Err(ConfigError::InvalidParameter {
            parameter: "max_atoms",
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_without_overrides_matches_defaults() {
        let built = FitConfigBuilder::new().build().unwrap();
        assert_eq!(built, FitConfig::default());
    }

    #[test]
    fn builder_overrides_only_the_given_parameters() {
        let config = FitConfigBuilder::new()
            .threshold(0.25)
            .grow(false)
            .n_atoms_detect(Some(4))
            .build()
            .unwrap();
        assert_eq!(config.detection.threshold, 0.25);
        assert_eq!(config.detection.n_atoms_detect, Some(4));
        assert!(!config.search.grow);
        assert_eq!(config.detection.peak_value, 1.5);
    }

    #[test]
    fn build_rejects_non_positive_peak_value() {
        let result = FitConfigBuilder::new().peak_value(0.0).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                parameter: "peak_value",
                ..
            })
        ));
    }

    #[test]
    fn build_rejects_negative_min_dist() {
        let result = FitConfigBuilder::new().min_dist(-1.0).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                parameter: "min_dist",
                ..
            })
        ));
    }

    #[test]
    fn build_rejects_zero_detection_cap_and_zero_budgets() {
        assert!(FitConfigBuilder::new().n_atoms_detect(Some(0)).build().is_err());
        assert!(FitConfigBuilder::new().max_iterations(0).build().is_err());
        assert!(FitConfigBuilder::new().max_atoms(0).build().is_err());
    }

    #[test]
    fn build_rejects_non_positive_learning_rate() {
        let result = FitConfigBuilder::new().learning_rate(-0.1).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                parameter: "learning_rate",
                ..
            })
        ));
    }
}
