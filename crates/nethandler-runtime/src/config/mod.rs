//! Configuration module for the NetHandler runtime.
//!
//! Layered loading with figment (defaults, profile file, main file,
//! environment, programmatic overrides) plus validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, NetHandlerConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
