use thiserror::Error;
use voxfit::core::grid::GridError;
use voxfit::core::typing::TyperError;
use voxfit::engine::config::ConfigError;
use voxfit::engine::error::EngineError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Typing scheme error: {0}")]
    Typer(#[from] TyperError),

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("Fitting failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Failed to initialize thread pool: {0}")]
    ThreadPool(String),
}
