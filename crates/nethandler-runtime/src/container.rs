//! In-memory handler container.
//!
//! [`ServiceCollection`] gathers handler registrations; [`build`](ServiceCollection::build)
//! freezes them into a [`ServiceProvider`], which implements
//! [`HandlerRegistry`] and hands out [`Dispatcher`]s.
//!
//! ```rust,ignore
//! let mut services = ServiceCollection::new();
//! services
//!     .add_request_handler::<Greet, _>(GreetHandler)
//!     .add_notification_handler_factory::<UserCreated, _, _>(AuditLog::default)
//!     .add_module(BillingModule);
//!
//! let provider = services.build();
//! let dispatcher = provider.dispatcher();
//! ```
//!
//! Registrations are keyed by capability and kept in registration order.
//! For requests the last registration wins; notifications go to every
//! registration.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use nethandler_core::{
    AnyHandler, CapabilityDescriptor, CapabilityKind, Dispatcher, HandlerRegistry, HandlerShape,
    InvocationCache, Notification, NotificationHandler, PublishMode, Request, RequestHandler,
    ResolvedHandler, TypeKey,
};
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::module::HandlerModule;

/// How long a registered handler instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One instance shared by every resolution.
    Singleton,
    /// A new instance for every resolution.
    Transient,
}

type Factory = Arc<dyn Fn() -> AnyHandler + Send + Sync>;

#[derive(Clone)]
enum Source {
    Instance(AnyHandler),
    Factory(Factory),
}

#[derive(Clone)]
struct Registration {
    source: Source,
    shape: HandlerShape,
}

impl Registration {
    fn singleton<H: Any + Send + Sync>(handler: H, shape: HandlerShape) -> Self {
        Self {
            source: Source::Instance(Arc::new(handler)),
            shape,
        }
    }

    fn transient<H, F>(factory: F, shape: HandlerShape) -> Self
    where
        H: Any + Send + Sync,
        F: Fn() -> H + Send + Sync + 'static,
    {
        Self {
            source: Source::Factory(Arc::new(move || Arc::new(factory()) as AnyHandler)),
            shape,
        }
    }

    fn lifetime(&self) -> Lifetime {
        match self.source {
            Source::Instance(_) => Lifetime::Singleton,
            Source::Factory(_) => Lifetime::Transient,
        }
    }

    fn resolve(&self) -> ResolvedHandler {
        let instance = match &self.source {
            Source::Instance(instance) => Arc::clone(instance),
            Source::Factory(factory) => factory(),
        };
        ResolvedHandler::new(instance, self.shape.clone())
    }
}

// =============================================================================
// ServiceCollection
// =============================================================================

/// Collects handler registrations.
#[derive(Default)]
pub struct ServiceCollection {
    registrations: HashMap<CapabilityDescriptor, Vec<Registration>>,
    dispatch: DispatchConfig,
}

impl ServiceCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies dispatcher settings to the dispatchers the provider creates.
    pub fn with_config(&mut self, config: &DispatchConfig) -> &mut Self {
        self.dispatch = *config;
        self
    }

    /// Sets the publish mode of the dispatchers the provider creates.
    pub fn publish_mode(&mut self, mode: PublishMode) -> &mut Self {
        self.dispatch.publish_mode = mode;
        self
    }

    /// Registers a singleton handler for request `R`.
    pub fn add_request_handler<R, H>(&mut self, handler: H) -> &mut Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        self.insert(
            CapabilityDescriptor::request::<R>(),
            Registration::singleton(handler, HandlerShape::for_request::<H, R>()),
        )
    }

    /// Registers a transient handler for request `R`, created by `factory` on every resolution.
    pub fn add_request_handler_factory<R, H, F>(&mut self, factory: F) -> &mut Self
    where
        R: Request,
        H: RequestHandler<R>,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.insert(
            CapabilityDescriptor::request::<R>(),
            Registration::transient(factory, HandlerShape::for_request::<H, R>()),
        )
    }

    /// Registers a singleton handler for notification `N`.
    pub fn add_notification_handler<N, H>(&mut self, handler: H) -> &mut Self
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        self.insert(
            CapabilityDescriptor::notification::<N>(),
            Registration::singleton(handler, HandlerShape::for_notification::<H, N>()),
        )
    }

    /// Registers a transient handler for notification `N`.
    pub fn add_notification_handler_factory<N, H, F>(&mut self, factory: F) -> &mut Self
    where
        N: Notification,
        H: NotificationHandler<N>,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.insert(
            CapabilityDescriptor::notification::<N>(),
            Registration::transient(factory, HandlerShape::for_notification::<H, N>()),
        )
    }

    /// Registers one singleton under every capability its shape declares.
    ///
    /// All capabilities resolve to the same instance, and a capability
    /// declared more than once is registered once. Fails if `shape`
    /// describes a type other than `H`.
    pub fn add_handler<H: Any + Send + Sync>(
        &mut self,
        handler: H,
        shape: HandlerShape,
    ) -> RuntimeResult<&mut Self> {
        let handler_type = TypeKey::of::<H>();
        if shape.handler_type() != handler_type {
            return Err(RuntimeError::ShapeMismatch {
                handler: handler_type,
                shape: shape.handler_type(),
            });
        }

        let registration = Registration::singleton(handler, shape);
        let mut seen = HashSet::new();
        let capabilities: Vec<_> = registration
            .shape
            .capabilities()
            .filter(|capability| seen.insert(*capability))
            .collect();
        for capability in capabilities {
            self.insert(capability, registration.clone());
        }
        Ok(self)
    }

    /// Lets a module add its registrations.
    pub fn add_module<M: HandlerModule + ?Sized>(&mut self, module: &M) -> &mut Self {
        let before = self.len();
        module.register(self);
        info!(
            module = module.name(),
            registrations = self.len() - before,
            "Registered handler module"
        );
        self
    }

    /// Adds several modules in order.
    pub fn add_modules<'m, I>(&mut self, modules: I) -> &mut Self
    where
        I: IntoIterator<Item = &'m dyn HandlerModule>,
    {
        for module in modules {
            self.add_module(module);
        }
        self
    }

    /// Returns the total number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Returns `true` if at least one handler is registered for `capability`.
    pub fn contains(&self, capability: &CapabilityDescriptor) -> bool {
        self.registrations.contains_key(capability)
    }

    fn insert(&mut self, capability: CapabilityDescriptor, registration: Registration) -> &mut Self {
        let handler = registration.shape.handler_type();
        let lifetime = registration.lifetime();
        let slot = self.registrations.entry(capability).or_default();

        if capability.kind() == CapabilityKind::Request
            && let Some(previous) = slot.last()
        {
            warn!(
                capability = %capability,
                previous = %previous.shape.handler_type(),
                handler = %handler,
                "Request handler registered more than once, the last registration wins"
            );
        }

        slot.push(registration);
        debug!(capability = %capability, handler = %handler, ?lifetime, "Registered handler");
        self
    }

    /// Freezes the registrations into a provider.
    pub fn build(self) -> ServiceProvider {
        info!(
            capabilities = self.registrations.len(),
            registrations = self.len(),
            publish_mode = %self.dispatch.publish_mode,
            "Built handler provider"
        );
        ServiceProvider {
            inner: Arc::new(ProviderInner {
                registrations: self.registrations,
                dispatch: self.dispatch,
                cache: Arc::new(InvocationCache::new()),
            }),
        }
    }
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("capabilities", &self.registrations.keys().collect::<Vec<_>>())
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

// =============================================================================
// ServiceProvider
// =============================================================================

struct ProviderInner {
    registrations: HashMap<CapabilityDescriptor, Vec<Registration>>,
    dispatch: DispatchConfig,
    cache: Arc<InvocationCache>,
}

/// Resolves the handlers of a built [`ServiceCollection`].
///
/// Cheap to clone; clones share registrations and the invocation cache.
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    /// Creates a dispatcher over this provider.
    ///
    /// Every dispatcher created here shares the provider's invocation cache.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::with_cache(Arc::new(self.clone()), Arc::clone(&self.inner.cache))
            .with_publish_mode(self.inner.dispatch.publish_mode)
    }

    /// Returns the shared invocation cache.
    pub fn cache(&self) -> &Arc<InvocationCache> {
        &self.inner.cache
    }

    /// Returns the dispatcher settings.
    pub fn dispatch_config(&self) -> &DispatchConfig {
        &self.inner.dispatch
    }

    /// Returns every capability with at least one registration.
    pub fn capabilities(&self) -> impl Iterator<Item = &CapabilityDescriptor> + '_ {
        self.inner.registrations.keys()
    }

    /// Returns the handler types registered for `capability`, in registration order.
    pub fn handler_types(&self, capability: &CapabilityDescriptor) -> Vec<TypeKey> {
        self.inner
            .registrations
            .get(capability)
            .map(|slot| slot.iter().map(|r| r.shape.handler_type()).collect())
            .unwrap_or_default()
    }
}

impl HandlerRegistry for ServiceProvider {
    fn resolve_one(&self, capability: &CapabilityDescriptor) -> Option<ResolvedHandler> {
        self.inner
            .registrations
            .get(capability)
            .and_then(|slot| slot.last())
            .map(Registration::resolve)
    }

    fn resolve_all(&self, capability: &CapabilityDescriptor) -> Vec<ResolvedHandler> {
        self.inner
            .registrations
            .get(capability)
            .map(|slot| slot.iter().map(Registration::resolve).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("capabilities", &self.inner.registrations.len())
            .field("dispatch", &self.inner.dispatch)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::module_fn;
    use async_trait::async_trait;
    use nethandler_core::{CancellationToken, HandlerResult};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Lookup(u32);

    impl Request for Lookup {
        type Response = String;
    }

    struct Evicted(u32);

    impl Notification for Evicted {}

    struct Directory {
        prefix: &'static str,
    }

    #[async_trait]
    impl RequestHandler<Lookup> for Directory {
        async fn handle(&self, request: &Lookup, _: CancellationToken) -> HandlerResult<String> {
            Ok(format!("{}{}", self.prefix, request.0))
        }
    }

    #[async_trait]
    impl NotificationHandler<Evicted> for Directory {
        async fn handle(&self, _: &Evicted, _: CancellationToken) -> HandlerResult<()> {
            Ok(())
        }
    }

    struct Journal {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotificationHandler<Evicted> for Journal {
        async fn handle(&self, note: &Evicted, _: CancellationToken) -> HandlerResult<()> {
            self.log.lock().push(format!("{}:{}", self.name, note.0));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_last_request_registration_wins() {
        let mut services = ServiceCollection::new();
        services
            .add_request_handler::<Lookup, _>(Directory { prefix: "old-" })
            .add_request_handler::<Lookup, _>(Directory { prefix: "new-" });
        let provider = services.build();

        let capability = CapabilityDescriptor::request::<Lookup>();
        assert_eq!(provider.handler_types(&capability).len(), 2);

        let response = provider
            .dispatcher()
            .send(&Lookup(7), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response, "new-7");
    }

    #[tokio::test]
    async fn test_notifications_resolve_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut services = ServiceCollection::new();
        for name in ["first", "second"] {
            services.add_notification_handler::<Evicted, _>(Journal {
                name,
                log: Arc::clone(&log),
            });
        }
        let provider = services.build();

        provider
            .dispatcher()
            .publish(&Evicted(3), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["first:3", "second:3"]);
    }

    #[test]
    fn test_singleton_and_transient_lifetimes() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);

        let mut services = ServiceCollection::new();
        services
            .add_request_handler::<Lookup, _>(Directory { prefix: "" })
            .add_notification_handler_factory::<Evicted, _, _>(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Directory { prefix: "" }
            });
        let provider = services.build();

        let lookup = CapabilityDescriptor::request::<Lookup>();
        let a = provider.resolve_one(&lookup).unwrap();
        let b = provider.resolve_one(&lookup).unwrap();
        assert!(Arc::ptr_eq(a.instance(), b.instance()));

        let evicted = CapabilityDescriptor::notification::<Evicted>();
        let c = provider.resolve_all(&evicted).pop().unwrap();
        let d = provider.resolve_all(&evicted).pop().unwrap();
        assert!(!Arc::ptr_eq(c.instance(), d.instance()));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_handlers_share_cached_invoker() {
        let mut services = ServiceCollection::new();
        services.add_request_handler_factory::<Lookup, _, _>(|| Directory { prefix: "t-" });
        let provider = services.build();

        let first = provider.dispatcher();
        let second = provider.dispatcher();
        first.send(&Lookup(1), CancellationToken::new()).await.unwrap();
        second.send(&Lookup(2), CancellationToken::new()).await.unwrap();

        let stats = provider.cache().stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_multi_capability_handler_shares_instance() {
        let mut services = ServiceCollection::new();
        services
            .add_handler(
                Directory { prefix: "dir-" },
                HandlerShape::builder::<Directory>()
                    .request::<Lookup>()
                    .notification::<Evicted>()
                    .build(),
            )
            .unwrap();
        let provider = services.build();

        let lookup = provider
            .resolve_one(&CapabilityDescriptor::request::<Lookup>())
            .unwrap();
        let evicted = provider
            .resolve_all(&CapabilityDescriptor::notification::<Evicted>())
            .pop()
            .unwrap();
        assert!(Arc::ptr_eq(lookup.instance(), evicted.instance()));

        let dispatcher = provider.dispatcher();
        assert_eq!(
            dispatcher.send(&Lookup(9), CancellationToken::new()).await.unwrap(),
            "dir-9"
        );
        dispatcher
            .publish(&Evicted(9), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provider.cache().len(), 2);
    }

    #[test]
    fn test_add_handler_rejects_shape_of_another_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut services = ServiceCollection::new();

        let err = services
            .add_handler(
                Journal {
                    name: "j",
                    log: Arc::clone(&log),
                },
                HandlerShape::for_notification::<Directory, Evicted>(),
            )
            .unwrap_err();

        match err {
            RuntimeError::ShapeMismatch { handler, shape } => {
                assert!(handler.is::<Journal>());
                assert!(shape.is::<Directory>());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(services.is_empty());
    }

    #[tokio::test]
    async fn test_add_handler_registers_repeated_capability_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut services = ServiceCollection::new();
        services
            .add_handler(
                Journal {
                    name: "once",
                    log: Arc::clone(&log),
                },
                HandlerShape::builder::<Journal>()
                    .notification::<Evicted>()
                    .notification::<Evicted>()
                    .build(),
            )
            .unwrap();
        assert_eq!(services.len(), 1);

        let provider = services.build();
        provider
            .dispatcher()
            .publish(&Evicted(4), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["once:4"]);
    }

    #[test]
    fn test_config_sets_publish_mode() {
        let mut services = ServiceCollection::new();
        services.with_config(&DispatchConfig {
            publish_mode: PublishMode::Parallel,
        });
        let provider = services.build();

        assert_eq!(provider.dispatcher().publish_mode(), PublishMode::Parallel);
        assert!(provider.capabilities().next().is_none());
    }

    #[test]
    fn test_modules_register_in_order() {
        let lookups = module_fn("lookups", |services: &mut ServiceCollection| {
            services.add_request_handler::<Lookup, _>(Directory { prefix: "a-" });
        });
        let overrides = module_fn("overrides", |services: &mut ServiceCollection| {
            services.add_request_handler::<Lookup, _>(Directory { prefix: "b-" });
        });

        let mut services = ServiceCollection::new();
        services.add_modules([&lookups as &dyn HandlerModule, &overrides]);
        assert_eq!(services.len(), 2);
        assert!(services.contains(&CapabilityDescriptor::request::<Lookup>()));
        assert!(!services.contains(&CapabilityDescriptor::notification::<Evicted>()));
    }

    #[tokio::test]
    async fn test_unregistered_request_is_not_found() {
        let provider = ServiceCollection::new().build();
        let err = provider
            .dispatcher()
            .send(&Lookup(1), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
