//! Error types for the dispatch engine.
//!
//! The dispatcher is a pure routing layer: it never recovers from, logs or
//! retries a failure. Everything below is returned to the caller as-is.

use std::fmt;

use thiserror::Error;

use crate::capability::{CapabilityDescriptor, TypeKey};

/// Boxed error produced by handler implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by handler operations.
pub type HandlerResult<T> = Result<T, BoxError>;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors surfaced by [`Dispatcher::send`](crate::Dispatcher::send) and
/// [`Dispatcher::publish`](crate::Dispatcher::publish).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The registry resolved no handler for a request capability.
    #[error(
        "no handler registered for request '{}'; register a {capability} with the handler registry",
        .capability.message_type()
    )]
    HandlerNotFound {
        /// The capability that could not be resolved.
        capability: CapabilityDescriptor,
    },

    /// A resolved handler does not expose the operation its registration declared.
    #[error(transparent)]
    InvalidHandlerShape(#[from] InvalidHandlerShape),

    /// The handler's own operation failed.
    #[error(transparent)]
    HandlerFailed(#[from] HandlerFailure),

    /// One or more handlers failed during a parallel publish.
    #[error(transparent)]
    Aggregate(#[from] AggregateFailure),
}

impl DispatchError {
    /// Returns `true` if this is a [`DispatchError::HandlerNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HandlerNotFound { .. })
    }

    /// Returns the handler failure if this error wraps exactly one.
    pub fn as_handler_failure(&self) -> Option<&HandlerFailure> {
        match self {
            Self::HandlerFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

// =============================================================================
// Handler Shape Errors
// =============================================================================

/// What is wrong with a handler's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeDefect {
    /// The registered shape describes a different concrete type than the instance.
    TypeMismatch,
    /// The handler type declares no operation for the requested capability.
    MissingCapability,
    /// The operation produced a value of a type other than the declared response.
    ResponseMismatch,
}

impl fmt::Display for ShapeDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TypeMismatch => "the registered shape does not describe the resolved instance",
            Self::MissingCapability => "the handler declares no matching operation",
            Self::ResponseMismatch => "the operation produced an unexpected response type",
        })
    }
}

/// A resolved handler cannot serve the capability it was resolved for.
///
/// This is a registration defect. Once produced for a registration's shape
/// it is cached, so later dispatches through that registration fail the same
/// way without rebuilding anything.
#[derive(Debug, Clone, Error)]
#[error("handler '{handler}' cannot serve {capability}: {defect}")]
pub struct InvalidHandlerShape {
    /// The handler's concrete type, as declared by its shape.
    pub handler: TypeKey,
    /// The capability the handler was resolved for.
    pub capability: CapabilityDescriptor,
    /// Why the handler cannot serve it.
    pub defect: ShapeDefect,
}

impl InvalidHandlerShape {
    /// Creates a new shape error.
    pub fn new(handler: TypeKey, capability: CapabilityDescriptor, defect: ShapeDefect) -> Self {
        Self {
            handler,
            capability,
            defect,
        }
    }
}

// =============================================================================
// Handler Execution Errors
// =============================================================================

/// A failure raised by a handler's own operation.
///
/// The original error is kept untouched; use [`inner`](Self::inner) or
/// [`into_inner`](Self::into_inner) to downcast it.
#[derive(Debug, Error)]
#[error("handler '{handler}' failed: {source}")]
pub struct HandlerFailure {
    /// The concrete type of the failing handler.
    pub handler: TypeKey,
    #[source]
    source: BoxError,
}

impl HandlerFailure {
    /// Wraps an error raised by `handler`.
    pub fn new(handler: TypeKey, source: BoxError) -> Self {
        Self { handler, source }
    }

    /// Returns the handler's original error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.source
    }

    /// Consumes the failure and returns the handler's original error.
    pub fn into_inner(self) -> BoxError {
        self.source
    }
}

/// All failures collected from a parallel publish.
#[derive(Debug, Error)]
#[error(
    "{} of {attempted} handlers failed for {capability}: {}",
    .failures.len(),
    summarize(.failures)
)]
pub struct AggregateFailure {
    /// The notification capability that was published.
    pub capability: CapabilityDescriptor,
    /// How many handlers were started.
    pub attempted: usize,
    failures: Vec<DispatchError>,
}

impl AggregateFailure {
    /// Creates an aggregate from the failures of `attempted` handlers.
    pub fn new(
        capability: CapabilityDescriptor,
        attempted: usize,
        failures: Vec<DispatchError>,
    ) -> Self {
        Self {
            capability,
            attempted,
            failures,
        }
    }

    /// Returns the individual failures in resolution order.
    pub fn failures(&self) -> &[DispatchError] {
        &self.failures
    }

    /// Consumes the aggregate and returns the individual failures.
    pub fn into_failures(self) -> Vec<DispatchError> {
        self.failures
    }
}

fn summarize(failures: &[DispatchError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Notification, Request};

    struct Ping;

    impl Request for Ping {
        type Response = String;
    }

    struct Tick;

    impl Notification for Tick {}

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_not_found_names_capability() {
        let err = DispatchError::HandlerNotFound {
            capability: CapabilityDescriptor::request::<Ping>(),
        };
        let message = err.to_string();
        assert!(err.is_not_found());
        assert!(message.contains("'Ping'"));
        assert!(message.contains("RequestHandler<Ping, String>"));
    }

    #[test]
    fn test_handler_failure_keeps_original_error() {
        let failure = HandlerFailure::new(TypeKey::of::<u8>(), Box::new(DiskFull));
        assert!(failure.inner().downcast_ref::<DiskFull>().is_some());
        assert_eq!(failure.to_string(), "handler 'u8' failed: disk full");

        let original = failure.into_inner();
        assert!(original.downcast::<DiskFull>().is_ok());
    }

    #[test]
    fn test_aggregate_lists_every_failure() {
        let failures = vec![
            DispatchError::from(HandlerFailure::new(TypeKey::of::<u8>(), Box::new(DiskFull))),
            DispatchError::from(HandlerFailure::new(TypeKey::of::<u16>(), "boom".into())),
        ];
        let aggregate =
            AggregateFailure::new(CapabilityDescriptor::notification::<Tick>(), 3, failures);

        assert_eq!(aggregate.failures().len(), 2);
        let message = aggregate.to_string();
        assert!(message.starts_with("2 of 3 handlers failed for NotificationHandler<Tick>"));
        assert!(message.contains("disk full"));
        assert!(message.contains("boom"));
    }
}
