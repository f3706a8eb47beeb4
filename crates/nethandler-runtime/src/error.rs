//! Runtime error types.

use nethandler_core::TypeKey;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while setting up the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A global tracing subscriber is already installed.
    #[error("Failed to install the logging subscriber: {0}")]
    LoggingInit(#[from] tracing_subscriber::util::TryInitError),

    /// A handler was registered with the shape of another type.
    #[error("cannot register handler '{handler}' with a shape describing '{shape}'")]
    ShapeMismatch {
        /// The registered instance's type.
        handler: TypeKey,
        /// The type the shape describes.
        shape: TypeKey,
    },

    /// The log file appender could not be created.
    #[error("Failed to open the log file: {0}")]
    LogFile(#[from] tracing_appender::rolling::InitError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
