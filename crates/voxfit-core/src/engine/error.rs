use thiserror::Error;

use super::config::ConfigError;
use super::kernel::KernelError;
use crate::core::grid::GridError;
use crate::core::typing::TyperError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Kernel construction failed: {source}")]
    Kernel {
        #[from]
        source: KernelError,
    },

    #[error("Grid error: {source}")]
    Grid {
        #[from]
        source: GridError,
    },

    #[error("Typing scheme error: {source}")]
    Typer {
        #[from]
        source: TyperError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
