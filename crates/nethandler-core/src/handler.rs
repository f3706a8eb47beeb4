//! Handler traits.
//!
//! A handler implements a capability: [`RequestHandler<R>`] ties request `R`
//! to its declared response, [`NotificationHandler<N>`] observes notification
//! `N`. Both expose one asynchronous operation that consumes the message and
//! a cancellation signal.
//!
//! # Example
//!
//! ```rust,ignore
//! use nethandler_core::{CancellationToken, HandlerResult, RequestHandler};
//!
//! struct GreetHandler;
//!
//! #[async_trait::async_trait]
//! impl RequestHandler<Greet> for GreetHandler {
//!     async fn handle(&self, request: &Greet, _: CancellationToken) -> HandlerResult<String> {
//!         Ok(format!("Hello, {}!", request.name))
//!     }
//! }
//! ```
//!
//! Closures can be used directly through [`request_fn`] and [`notification_fn`]:
//!
//! ```rust,ignore
//! let handler = request_fn(|request: &Greet, _| {
//!     let name = request.name.clone();
//!     async move { Ok(format!("Hello, {name}!")) }
//! });
//! ```

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerResult;
use crate::message::{Notification, Request};

/// Handles request `R` and produces its declared response.
///
/// Cancellation is passed through untouched. A handler that observes the
/// token and aborts should return an error; the dispatcher hands that error
/// to the caller unmodified.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    /// Consumes the request and produces the response.
    async fn handle(
        &self,
        request: &R,
        cancellation: CancellationToken,
    ) -> HandlerResult<R::Response>;
}

/// Observes notification `N`.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync + 'static {
    /// Consumes the notification.
    async fn handle(&self, notification: &N, cancellation: CancellationToken) -> HandlerResult<()>;
}

// ============================================================================
// Closure adapters
// ============================================================================

/// A [`RequestHandler`] backed by a closure. Created by [`request_fn`].
pub struct RequestFn<F, R, Fut> {
    f: F,
    _marker: PhantomData<fn() -> (R, Fut)>,
}

/// Turns a closure into a [`RequestHandler`].
///
/// The returned future must not borrow the request; clone what it needs
/// before the `async move` block.
pub fn request_fn<F, R, Fut>(f: F) -> RequestFn<F, R, Fut>
where
    R: Request,
    F: Fn(&R, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<R::Response>> + Send + 'static,
{
    RequestFn {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, R, Fut> RequestHandler<R> for RequestFn<F, R, Fut>
where
    R: Request,
    F: Fn(&R, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<R::Response>> + Send + 'static,
{
    async fn handle(
        &self,
        request: &R,
        cancellation: CancellationToken,
    ) -> HandlerResult<R::Response> {
        (self.f)(request, cancellation).await
    }
}

/// A [`NotificationHandler`] backed by a closure. Created by [`notification_fn`].
pub struct NotificationFn<F, N, Fut> {
    f: F,
    _marker: PhantomData<fn() -> (N, Fut)>,
}

/// Turns a closure into a [`NotificationHandler`].
pub fn notification_fn<F, N, Fut>(f: F) -> NotificationFn<F, N, Fut>
where
    N: Notification,
    F: Fn(&N, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    NotificationFn {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, N, Fut> NotificationHandler<N> for NotificationFn<F, N, Fut>
where
    N: Notification,
    F: Fn(&N, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    async fn handle(&self, notification: &N, cancellation: CancellationToken) -> HandlerResult<()> {
        (self.f)(notification, cancellation).await
    }
}
