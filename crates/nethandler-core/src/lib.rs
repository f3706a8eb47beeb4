//! # NetHandler Core
//!
//! The dispatch engine of the NetHandler mediator.
//!
//! Callers hand a message to the [`Dispatcher`] instead of calling a handler
//! directly. Requests are routed to exactly one handler and produce a typed
//! response; notifications are broadcast to every registered handler.
//!
//! ## Building Blocks
//!
//! - **Messages**: [`Request`] with its associated response, and [`Notification`]
//! - **Handlers**: [`RequestHandler`] and [`NotificationHandler`], plus the
//!   closure adapters [`request_fn`] and [`notification_fn`]
//! - **Capabilities**: [`CapabilityDescriptor`] identifies which handlers apply
//!   to a message
//! - **Shapes**: [`HandlerShape`] lists the capabilities a concrete handler type
//!   implements and carries a type-erased [`Invoker`] for each
//! - **Registry**: [`HandlerRegistry`] resolves handler instances; it is the
//!   seam a dependency-injection container plugs into
//! - **Cache**: [`InvocationCache`] keeps the invoker selected for each
//!   (handler type, shape, capability) triple
//!
//! ## Flow
//!
//! ```text
//! ┌────────┐  send/publish  ┌────────────┐  resolve  ┌──────────┐
//! │ Caller │───────────────▶│ Dispatcher │──────────▶│ Registry │
//! └────────┘                └────────────┘           └──────────┘
//!                                 │ get_or_build
//!                                 ▼
//!                          ┌─────────────────┐  invoke  ┌─────────┐
//!                          │ InvocationCache │─────────▶│ Handler │
//!                          └─────────────────┘          └─────────┘
//! ```
//!
//! Registration, lifetimes and configuration live in `nethandler-runtime`.

pub mod cache;
pub mod capability;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod shape;

pub use cache::{CacheStats, CachedInvoker, InvocationCache};
pub use capability::{CapabilityDescriptor, CapabilityKind, TypeKey};
pub use dispatcher::{Dispatch, Dispatcher, PublishMode};
pub use error::{
    AggregateFailure, BoxError, DispatchError, DispatchResult, HandlerFailure, HandlerResult,
    InvalidHandlerShape, ShapeDefect,
};
pub use handler::{
    NotificationFn, NotificationHandler, RequestFn, RequestHandler, notification_fn, request_fn,
};
pub use message::{Notification, Request};
pub use registry::{EmptyRegistry, HandlerRegistry, ResolvedHandler};
pub use shape::{
    AnyHandler, ErasedInvoker, ErasedResponse, HandlerShape, Invoker, ShapeBuilder, ShapeId,
};

pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        CancellationToken, Dispatch, DispatchError, DispatchResult, Dispatcher, HandlerResult,
        HandlerShape, Notification, NotificationHandler, PublishMode, Request, RequestHandler,
        async_trait, notification_fn, request_fn,
    };
}
