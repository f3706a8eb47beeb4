//! Message contracts.
//!
//! Callers construct requests and notifications, pass them by reference to
//! the [`Dispatcher`](crate::Dispatcher) and drop them once the call returns.
//! The dispatcher never mutates a message.
//!
//! Both traits can be derived with the `nethandler` facade:
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
//! #[derive(Notification)]
//! struct UserCreated {
//!     id: u64,
//! }
//! ```

/// A value representing an operation with exactly one expected response.
///
/// The associated [`Response`](Request::Response) type is the response half
/// of the request's capability descriptor: a handler registered for
/// `(Self, Self::Response)` is the one [`send`](crate::Dispatcher::send) routes to.
pub trait Request: Send + Sync + 'static {
    /// The response produced by this request's handler.
    type Response: Send + 'static;
}

/// A value representing an event broadcast to zero or more handlers.
pub trait Notification: Send + Sync + 'static {}
