use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use voxfit::engine::config::{FitConfig, FitConfigBuilder, MoveOrder, SuppressionScope};

/// On-disk configuration for the CLI, mapped onto the library's config
/// builder. Every field is optional; unset values keep library defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    #[serde(default)]
    pub grid: GridSection,
    #[serde(default)]
    pub typer: TyperSection,
    #[serde(default)]
    pub detection: DetectionSection,
    #[serde(default)]
    pub refinement: RefinementSection,
    #[serde(default)]
    pub search: SearchSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct GridSection {
    #[serde(default = "GridSection::default_resolution")]
    pub resolution: f64,
    #[serde(default = "GridSection::default_dimension")]
    pub dimension: f64,
}

impl GridSection {
    fn default_resolution() -> f64 {
        0.5
    }
    fn default_dimension() -> f64 {
        12.0
    }
}

impl Default for GridSection {
    fn default() -> Self {
        Self {
            resolution: Self::default_resolution(),
            dimension: Self::default_dimension(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TyperSection {
    /// Path to a typing-scheme TOML table; the built-in heavy-atom scheme is
    /// used when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct DetectionSection {
    pub apply_conv: Option<bool>,
    pub threshold: Option<f64>,
    pub peak_value: Option<f64>,
    pub min_dist: Option<f64>,
    pub suppression_scope: Option<ScopeName>,
    pub n_atoms_detect: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RefinementSection {
    pub interm_steps: Option<usize>,
    pub final_steps: Option<usize>,
    pub learning_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct SearchSection {
    pub grow: Option<bool>,
    pub prune: Option<bool>,
    pub move_order: Option<MoveOrderName>,
    pub max_iterations: Option<usize>,
    pub max_atoms: Option<usize>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeName {
    SameChannel,
    AllChannels,
}

impl From<ScopeName> for SuppressionScope {
    fn from(name: ScopeName) -> Self {
        match name {
            ScopeName::SameChannel => SuppressionScope::SameChannel,
            ScopeName::AllChannels => SuppressionScope::AllChannels,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MoveOrderName {
    AddThenRemove,
    RemoveThenAdd,
}

impl From<MoveOrderName> for MoveOrder {
    fn from(name: MoveOrderName) -> Self {
        match name {
            MoveOrderName::AddThenRemove => MoveOrder::AddThenRemove,
            MoveOrderName::RemoveThenAdd => MoveOrder::RemoveThenAdd,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Loads the file when given, the defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_fit_config(&self) -> Result<FitConfig> {
        let mut builder = FitConfigBuilder::new();
        if let Some(v) = self.detection.apply_conv {
            builder = builder.apply_conv(v);
        }
        if let Some(v) = self.detection.threshold {
            builder = builder.threshold(v);
        }
        if let Some(v) = self.detection.peak_value {
            builder = builder.peak_value(v);
        }
        if let Some(v) = self.detection.min_dist {
            builder = builder.min_dist(v);
        }
        if let Some(v) = self.detection.suppression_scope {
            builder = builder.suppression_scope(v.into());
        }
        if let Some(v) = self.detection.n_atoms_detect {
            builder = builder.n_atoms_detect(Some(v));
        }
        if let Some(v) = self.refinement.interm_steps {
            builder = builder.interm_steps(v);
        }
        if let Some(v) = self.refinement.final_steps {
            builder = builder.final_steps(v);
        }
        if let Some(v) = self.refinement.learning_rate {
            builder = builder.learning_rate(v);
        }
        if let Some(v) = self.search.grow {
            builder = builder.grow(v);
        }
        if let Some(v) = self.search.prune {
            builder = builder.prune(v);
        }
        if let Some(v) = self.search.move_order {
            builder = builder.move_order(v.into());
        }
        if let Some(v) = self.search.max_iterations {
            builder = builder.max_iterations(v);
        }
        if let Some(v) = self.search.max_atoms {
            builder = builder.max_atoms(v);
        }
        Ok(builder.build()?)
    }
}
