//! The dispatcher.
//!
//! [`Dispatcher`] is the public entry point. It routes a request to exactly
//! one handler, or fans a notification out to every handler the registry
//! resolves:
//!
//! ```text
//! caller ──send──▶ Dispatcher ──resolve_one──▶ Registry
//!                      │
//!                      └──get_or_build──▶ InvocationCache ──invoke──▶ Handler
//!
//! caller ──publish──▶ Dispatcher ──resolve_all──▶ Registry
//!                      │
//!                      ├──invoke──▶ Handler 1
//!                      ├──invoke──▶ Handler 2   (one at a time, or all at once)
//!                      └──invoke──▶ Handler n
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use nethandler_core::{CancellationToken, Dispatcher, PublishMode};
//!
//! let dispatcher = Dispatcher::new(Arc::new(registry));
//!
//! let greeting = dispatcher.send(&Greet { name: "Ada".into() }, CancellationToken::new()).await?;
//!
//! dispatcher
//!     .publish_with(&UserCreated { id: 7 }, PublishMode::Parallel, CancellationToken::new())
//!     .await?;
//! ```

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, span, trace};

use crate::cache::InvocationCache;
use crate::capability::CapabilityDescriptor;
use crate::error::{
    AggregateFailure, DispatchError, DispatchResult, InvalidHandlerShape, ShapeDefect,
};
use crate::message::{Notification, Request};
use crate::registry::{HandlerRegistry, ResolvedHandler};
use crate::shape::ErasedResponse;

/// How a notification is distributed to its handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    /// One handler at a time, in resolution order. The first failure stops
    /// the remaining handlers and is returned as-is.
    #[default]
    Sequential,
    /// All handlers at once. Every handler runs to completion and all
    /// failures are returned together as an [`AggregateFailure`].
    Parallel,
}

impl PublishMode {
    /// Returns the mode name as used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        }
    }
}

impl std::fmt::Display for PublishMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routes requests and notifications to handlers resolved from a registry.
///
/// # Thread Safety
///
/// `Dispatcher` is `Send + Sync` and cheap to clone; clones share the
/// registry and the invocation cache. Apart from that cache it holds no
/// state between calls.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<dyn HandlerRegistry>,
    cache: Arc<InvocationCache>,
    publish_mode: PublishMode,
}

impl Dispatcher {
    /// Creates a dispatcher with its own, empty invocation cache.
    pub fn new(registry: Arc<dyn HandlerRegistry>) -> Self {
        Self::with_cache(registry, Arc::new(InvocationCache::new()))
    }

    /// Creates a dispatcher that shares `cache` with other dispatchers.
    pub fn with_cache(registry: Arc<dyn HandlerRegistry>, cache: Arc<InvocationCache>) -> Self {
        Self {
            registry,
            cache,
            publish_mode: PublishMode::default(),
        }
    }

    /// Sets the mode used by [`publish`](Self::publish) (builder pattern).
    pub fn with_publish_mode(mut self, mode: PublishMode) -> Self {
        self.publish_mode = mode;
        self
    }

    /// Returns the mode used by [`publish`](Self::publish).
    pub fn publish_mode(&self) -> PublishMode {
        self.publish_mode
    }

    /// Returns the invocation cache.
    pub fn cache(&self) -> &Arc<InvocationCache> {
        &self.cache
    }

    /// Sends a request to its single handler and returns the response.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandlerNotFound`] if the registry resolves no handler.
    /// - [`DispatchError::InvalidHandlerShape`] if the resolved handler cannot
    ///   serve the request's capability.
    /// - [`DispatchError::HandlerFailed`] with the handler's own error.
    pub async fn send<R: Request>(
        &self,
        request: &R,
        cancellation: CancellationToken,
    ) -> DispatchResult<R::Response> {
        let capability = CapabilityDescriptor::request::<R>();
        let span = span!(Level::DEBUG, "send", capability = %capability);
        self.send_to_one(request, capability, cancellation)
            .instrument(span)
            .await
    }

    async fn send_to_one<R: Request>(
        &self,
        request: &R,
        capability: CapabilityDescriptor,
        cancellation: CancellationToken,
    ) -> DispatchResult<R::Response> {
        let handler = self
            .registry
            .resolve_one(&capability)
            .ok_or(DispatchError::HandlerNotFound { capability })?;

        let response = self
            .invoke(&handler, &capability, request, cancellation)
            .await?;

        match response.downcast::<R::Response>() {
            Ok(response) => Ok(*response),
            Err(_) => Err(InvalidHandlerShape::new(
                handler.handler_type(),
                capability,
                ShapeDefect::ResponseMismatch,
            )
            .into()),
        }
    }

    /// Publishes a notification using the dispatcher's default [`PublishMode`].
    pub async fn publish<N: Notification>(
        &self,
        notification: &N,
        cancellation: CancellationToken,
    ) -> DispatchResult<()> {
        self.publish_with(notification, self.publish_mode, cancellation)
            .await
    }

    /// Publishes a notification to every registered handler.
    ///
    /// Having no handlers is not an error. Handlers that completed before a
    /// failure keep their effects in either mode.
    ///
    /// # Errors
    ///
    /// - [`PublishMode::Sequential`]: the first failing handler's error; later
    ///   handlers are not started.
    /// - [`PublishMode::Parallel`]: [`DispatchError::Aggregate`] holding every
    ///   failure, once all handlers have finished.
    pub async fn publish_with<N: Notification>(
        &self,
        notification: &N,
        mode: PublishMode,
        cancellation: CancellationToken,
    ) -> DispatchResult<()> {
        let capability = CapabilityDescriptor::notification::<N>();
        let span = span!(Level::DEBUG, "publish", capability = %capability, mode = %mode);
        self.publish_to_all(notification, capability, mode, cancellation)
            .instrument(span)
            .await
    }

    async fn publish_to_all<N: Notification>(
        &self,
        notification: &N,
        capability: CapabilityDescriptor,
        mode: PublishMode,
        cancellation: CancellationToken,
    ) -> DispatchResult<()> {
        let handlers = self.registry.resolve_all(&capability);
        if handlers.is_empty() {
            trace!("No handlers registered, nothing to publish");
            return Ok(());
        }

        match mode {
            PublishMode::Sequential => {
                for handler in &handlers {
                    self.invoke(handler, &capability, notification, cancellation.clone())
                        .await?;
                }
                Ok(())
            }
            PublishMode::Parallel => {
                let outcomes = join_all(handlers.iter().map(|handler| {
                    self.invoke(handler, &capability, notification, cancellation.clone())
                }))
                .await;

                let failures: Vec<DispatchError> =
                    outcomes.into_iter().filter_map(Result::err).collect();
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(AggregateFailure::new(capability, handlers.len(), failures).into())
                }
            }
        }
    }

    /// Runs one handler through its cached invoker.
    async fn invoke(
        &self,
        handler: &ResolvedHandler,
        capability: &CapabilityDescriptor,
        message: &(dyn Any + Send + Sync),
        cancellation: CancellationToken,
    ) -> DispatchResult<ErasedResponse> {
        let invoker = self.cache.get_or_build(handler, capability)?;
        trace!(handler = %handler.handler_type(), "Invoking handler");
        invoker
            .invoke(handler.instance().as_ref(), message, cancellation)
            .await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("publish_mode", &self.publish_mode)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Dispatch trait
// =============================================================================

/// The dispatch interface callers can depend on instead of [`Dispatcher`].
///
/// Useful for substituting a test double in code that sends requests or
/// publishes notifications.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Sends a request to its single handler.
    async fn send<R: Request>(
        &self,
        request: &R,
        cancellation: CancellationToken,
    ) -> DispatchResult<R::Response>;

    /// Publishes a notification with the implementation's default mode.
    async fn publish<N: Notification>(
        &self,
        notification: &N,
        cancellation: CancellationToken,
    ) -> DispatchResult<()>;
}

#[async_trait]
impl Dispatch for Dispatcher {
    async fn send<R: Request>(
        &self,
        request: &R,
        cancellation: CancellationToken,
    ) -> DispatchResult<R::Response> {
        Dispatcher::send(self, request, cancellation).await
    }

    async fn publish<N: Notification>(
        &self,
        notification: &N,
        cancellation: CancellationToken,
    ) -> DispatchResult<()> {
        Dispatcher::publish(self, notification, cancellation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HandlerResult, ShapeDefect};
    use crate::handler::{NotificationHandler, RequestHandler};
    use crate::registry::EmptyRegistry;
    use crate::shape::HandlerShape;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // ---------------------------------------------------------------------
    // A minimal registry: descriptor -> ordered handlers.
    // ---------------------------------------------------------------------

    #[derive(Default)]
    struct MapRegistry {
        handlers: HashMap<CapabilityDescriptor, Vec<ResolvedHandler>>,
    }

    impl MapRegistry {
        fn with(mut self, capability: CapabilityDescriptor, handler: ResolvedHandler) -> Self {
            self.handlers.entry(capability).or_default().push(handler);
            self
        }

        fn into_dispatcher(self) -> Dispatcher {
            Dispatcher::new(Arc::new(self))
        }
    }

    impl HandlerRegistry for MapRegistry {
        fn resolve_one(&self, capability: &CapabilityDescriptor) -> Option<ResolvedHandler> {
            self.handlers
                .get(capability)
                .and_then(|handlers| handlers.last().cloned())
        }

        fn resolve_all(&self, capability: &CapabilityDescriptor) -> Vec<ResolvedHandler> {
            self.handlers.get(capability).cloned().unwrap_or_default()
        }
    }

    // ---------------------------------------------------------------------
    // Messages and handlers
    // ---------------------------------------------------------------------

    struct Greet(&'static str);

    impl Request for Greet {
        type Response = String;
    }

    struct Count;

    impl Request for Count {
        type Response = usize;
    }

    #[derive(Debug)]
    struct OrderPlaced(u32);

    impl Notification for OrderPlaced {}

    #[derive(Default)]
    struct Greeter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RequestHandler<Greet> for Greeter {
        async fn handle(&self, request: &Greet, _: CancellationToken) -> HandlerResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Hello, {}!", request.0))
        }
    }

    struct Waiter;

    #[async_trait]
    impl RequestHandler<Count> for Waiter {
        async fn handle(&self, _: &Count, cancellation: CancellationToken) -> HandlerResult<usize> {
            cancellation.cancelled().await;
            Err("cancelled while counting".into())
        }
    }

    /// Records its name into a shared log, optionally failing.
    struct Recorder {
        name: &'static str,
        fail: bool,
        delay: Duration,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl NotificationHandler<OrderPlaced> for Recorder {
        async fn handle(&self, _: &OrderPlaced, _: CancellationToken) -> HandlerResult<()> {
            tokio::time::sleep(self.delay).await;
            self.log.lock().push(self.name);
            if self.fail {
                return Err(format!("{} failed", self.name).into());
            }
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        fail: bool,
        delay_ms: u64,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> ResolvedHandler {
        ResolvedHandler::from_handler(
            Recorder {
                name,
                fail,
                delay: Duration::from_millis(delay_ms),
                log: Arc::clone(log),
            },
            HandlerShape::for_notification::<Recorder, OrderPlaced>(),
        )
    }

    fn order_registry(log: &Arc<Mutex<Vec<&'static str>>>, fail_b: bool) -> MapRegistry {
        let capability = CapabilityDescriptor::notification::<OrderPlaced>();
        MapRegistry::default()
            .with(capability, recorder("a", false, 30, log))
            .with(capability, recorder("b", fail_b, 10, log))
            .with(capability, recorder("c", false, 0, log))
    }

    // ---------------------------------------------------------------------
    // send
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_send_returns_handler_response() {
        let greeter = Arc::new(Greeter::default());
        let registry = MapRegistry::default().with(
            CapabilityDescriptor::request::<Greet>(),
            ResolvedHandler::new(
                greeter.clone(),
                HandlerShape::for_request::<Greeter, Greet>(),
            ),
        );
        let dispatcher = registry.into_dispatcher();

        let response = dispatcher
            .send(&Greet("Ada"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response, "Hello, Ada!");
        assert_eq!(greeter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_without_handler_fails_with_not_found() {
        let dispatcher = Dispatcher::new(Arc::new(EmptyRegistry));

        let err = dispatcher
            .send(&Greet("nobody"), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            DispatchError::HandlerNotFound { capability } => {
                assert_eq!(capability, CapabilityDescriptor::request::<Greet>());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_repeated_sends_reuse_cached_invoker() {
        let registry = MapRegistry::default().with(
            CapabilityDescriptor::request::<Greet>(),
            ResolvedHandler::from_handler(
                Greeter::default(),
                HandlerShape::for_request::<Greeter, Greet>(),
            ),
        );
        let dispatcher = registry.into_dispatcher();

        for name in ["a", "b", "c"] {
            let response = dispatcher
                .send(&Greet(name), CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(response, format!("Hello, {name}!"));
        }

        let stats = dispatcher.cache().stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn test_send_with_wrong_shape_fails_and_stays_failed() {
        // Registered under Greet, but the shape only declares Count.
        let registry = MapRegistry::default().with(
            CapabilityDescriptor::request::<Greet>(),
            ResolvedHandler::from_handler(
                Waiter,
                HandlerShape::for_request::<Waiter, Count>(),
            ),
        );
        let dispatcher = registry.into_dispatcher();

        for _ in 0..2 {
            let err = dispatcher
                .send(&Greet("x"), CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                DispatchError::InvalidHandlerShape(InvalidHandlerShape {
                    defect: ShapeDefect::MissingCapability,
                    ..
                })
            ));
        }
        assert_eq!(dispatcher.cache().stats().builds, 1);
    }

    #[tokio::test]
    async fn test_faulty_registry_does_not_break_one_sharing_its_cache() {
        let cache = Arc::new(InvocationCache::new());
        let capability = CapabilityDescriptor::request::<Greet>();

        let faulty = MapRegistry::default().with(
            capability,
            ResolvedHandler::from_handler(
                Greeter::default(),
                HandlerShape::builder::<Greeter>().build(),
            ),
        );
        let sound = MapRegistry::default().with(
            capability,
            ResolvedHandler::from_handler(
                Greeter::default(),
                HandlerShape::for_request::<Greeter, Greet>(),
            ),
        );
        let faulty = Dispatcher::with_cache(Arc::new(faulty), Arc::clone(&cache));
        let sound = Dispatcher::with_cache(Arc::new(sound), Arc::clone(&cache));

        let err = faulty
            .send(&Greet("x"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidHandlerShape(InvalidHandlerShape {
                defect: ShapeDefect::MissingCapability,
                ..
            })
        ));

        let response = sound
            .send(&Greet("Ada"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response, "Hello, Ada!");
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_send_passes_cancellation_through() {
        let registry = MapRegistry::default().with(
            CapabilityDescriptor::request::<Count>(),
            ResolvedHandler::from_handler(Waiter, HandlerShape::for_request::<Waiter, Count>()),
        );
        let dispatcher = registry.into_dispatcher();

        let token = CancellationToken::new();
        token.cancel();
        let err = dispatcher.send(&Count, token).await.unwrap_err();

        let failure = err.as_handler_failure().unwrap();
        assert!(failure.handler.is::<Waiter>());
        assert_eq!(failure.inner().to_string(), "cancelled while counting");
    }

    #[tokio::test]
    async fn test_dispatch_trait_routes_to_dispatcher() {
        async fn greet_via<D: Dispatch>(dispatch: &D) -> DispatchResult<String> {
            dispatch.send(&Greet("trait"), CancellationToken::new()).await
        }

        let registry = MapRegistry::default().with(
            CapabilityDescriptor::request::<Greet>(),
            ResolvedHandler::from_handler(
                Greeter::default(),
                HandlerShape::for_request::<Greeter, Greet>(),
            ),
        );
        let dispatcher = registry.into_dispatcher();

        assert_eq!(greet_via(&dispatcher).await.unwrap(), "Hello, trait!");
    }

    // ---------------------------------------------------------------------
    // publish
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_publish_without_handlers_succeeds() {
        let dispatcher = Dispatcher::new(Arc::new(EmptyRegistry));

        for mode in [PublishMode::Sequential, PublishMode::Parallel] {
            dispatcher
                .publish_with(&OrderPlaced(1), mode, CancellationToken::new())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_sequential_publish_runs_in_resolution_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = order_registry(&log, false).into_dispatcher();

        dispatcher
            .publish(&OrderPlaced(1), CancellationToken::new())
            .await
            .unwrap();

        // "a" sleeps longest but still finishes first.
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_sequential_publish_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = order_registry(&log, true).into_dispatcher();

        let err = dispatcher
            .publish_with(&OrderPlaced(1), PublishMode::Sequential, CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(*log.lock(), vec!["a", "b"]);
        let failure = err.as_handler_failure().unwrap();
        assert_eq!(failure.inner().to_string(), "b failed");
    }

    #[tokio::test]
    async fn test_parallel_publish_runs_all_and_aggregates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = order_registry(&log, true).into_dispatcher();

        let err = dispatcher
            .publish_with(&OrderPlaced(1), PublishMode::Parallel, CancellationToken::new())
            .await
            .unwrap_err();

        let mut ran = log.lock().clone();
        ran.sort_unstable();
        assert_eq!(ran, vec!["a", "b", "c"]);

        let DispatchError::Aggregate(aggregate) = err else {
            panic!("expected an aggregate failure");
        };
        assert_eq!(aggregate.attempted, 3);
        assert_eq!(aggregate.failures().len(), 1);
        assert!(aggregate.to_string().contains("b failed"));
    }

    #[tokio::test]
    async fn test_parallel_publish_runs_concurrently() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = order_registry(&log, false)
            .into_dispatcher()
            .with_publish_mode(PublishMode::Parallel);

        dispatcher
            .publish(&OrderPlaced(1), CancellationToken::new())
            .await
            .unwrap();

        // Shortest sleep finishes first when handlers overlap.
        assert_eq!(*log.lock(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_publish_mode_serde_names() {
        assert_eq!(PublishMode::default(), PublishMode::Sequential);

        for (mode, name) in [
            (PublishMode::Sequential, "sequential"),
            (PublishMode::Parallel, "parallel"),
        ] {
            assert_eq!(mode.as_str(), name);
            assert_eq!(mode.to_string(), name);

            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{name}\""));
            assert_eq!(serde_json::from_str::<PublishMode>(&json).unwrap(), mode);
        }

        assert!(serde_json::from_str::<PublishMode>("\"Parallel\"").is_err());
    }
}
