//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::tokenize::TokenizeError;
use marshal_core::{BuildError, EngineError};
use marshal_framework::InputError;

/// Errors that can occur while hosting a command manager.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The engine settings were accepted by the loader but rejected by the tree.
    #[error("Failed to build engine: {0}")]
    Build(#[from] BuildError),

    /// A command is misconfigured; see [`EngineError`].
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to read input: {0}")]
    Tokenize(#[from] TokenizeError),

    #[error("Failed to decode request: {0}")]
    Input(#[from] InputError),

    /// The logging subscriber could not be installed.
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
