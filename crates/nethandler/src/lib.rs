//! # NetHandler
//!
//! An in-process mediator for Rust.
//!
//! Code that wants something done hands a message to the [`Dispatcher`]
//! instead of calling the code that does it:
//!
//! - a **request** goes to exactly one handler and produces a typed response;
//! - a **notification** goes to every registered handler, one after another
//!   or all at once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ build  ┌─────────────────┐ dispatcher ┌────────────┐
//! │ Services     │───────▶│ ServiceProvider │───────────▶│ Dispatcher │
//! │ (collection) │        │  (registry)     │◀───resolve─│            │
//! └──────────────┘        └─────────────────┘            └────────────┘
//!                                                            │ invoke
//!                                                            ▼
//!                                                        handlers
//! ```
//!
//! - **core**: message contracts, handler traits, the dispatcher and its cache
//! - **runtime**: the handler container, configuration and logging setup
//! - **macros**: `#[derive(Request)]` and `#[derive(Notification)]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nethandler::prelude::*;
//!
//! #[derive(Request)]
//! #[request(response = String)]
//! struct Greet {
//!     name: String,
//! }
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl RequestHandler<Greet> for Greeter {
//!     async fn handle(&self, request: &Greet, _: CancellationToken) -> HandlerResult<String> {
//!         Ok(format!("Hello, {}!", request.name))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut services = ServiceCollection::new();
//!     services.add_request_handler::<Greet, _>(Greeter);
//!
//!     let dispatcher = services.build().dispatcher();
//!     let greeting = dispatcher
//!         .send(&Greet { name: "Ada".into() }, CancellationToken::new())
//!         .await?;
//!     println!("{greeting}");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `macros`: Enable the message derive macros (default)
//! - `toml-config`: Load `nethandler.toml` (default)
//! - `yaml-config`: Load `nethandler.yaml`
//! - `json-log`: JSON log output

extern crate self as nethandler;

pub use nethandler_core as core;
pub use nethandler_runtime as runtime;

pub use nethandler_core::{
    CancellationToken, Dispatch, DispatchError, DispatchResult, Dispatcher, HandlerResult,
    Notification, NotificationHandler, PublishMode, Request, RequestHandler,
};
#[cfg(feature = "macros")]
pub use nethandler_macros::{Notification, Request};
pub use nethandler_runtime::{HandlerModule, ServiceCollection, ServiceProvider};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use nethandler::prelude::*;
/// ```
pub mod prelude {
    // Messages, handlers and dispatch
    pub use nethandler_core::prelude::*;

    // Derives share their names with the traits they implement
    #[cfg(feature = "macros")]
    pub use nethandler_macros::{Notification, Request};

    // Registration
    pub use nethandler_runtime::{HandlerModule, ServiceCollection, ServiceProvider, module_fn};
}
