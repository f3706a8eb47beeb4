//! NetHandler Runtime - registration, configuration and logging.
//!
//! This crate provides:
//! - An in-memory handler container ([`ServiceCollection`], [`ServiceProvider`])
//!   implementing the core [`HandlerRegistry`](nethandler_core::HandlerRegistry) seam
//! - Handler modules ([`HandlerModule`]) for batching registrations
//! - Layered configuration loading with figment ([`config`])
//! - Logging setup on `tracing-subscriber` ([`logging`])
//!
//! ```ignore
//! use nethandler_runtime::{ServiceCollection, config, logging};
//!
//! let config = config::load_config()?;
//! config::validate_config(&config)?;
//! logging::init_from_config(&config.logging);
//!
//! let mut services = ServiceCollection::new();
//! services
//!     .with_config(&config.dispatch)
//!     .add_module(&AccountsModule);
//!
//! let dispatcher = services.build().dispatcher();
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod logging;
pub mod module;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, DispatchConfig, NetHandlerConfig};
pub use container::{Lifetime, ServiceCollection, ServiceProvider};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use module::{FnModule, HandlerModule, module_fn};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Provides the container types and the common logging macros.
pub mod prelude {
    pub use super::{HandlerModule, ServiceCollection, ServiceProvider, module_fn};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
