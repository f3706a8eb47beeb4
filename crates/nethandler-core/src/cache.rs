//! The invocation cache.
//!
//! Maps (concrete handler type, shape, capability) to the invoker that serves
//! it. Selecting an invoker means checking the handler's shape against the
//! instance and the requested capability; that work happens once per key and
//! the outcome, success or [`InvalidHandlerShape`], is kept for the life of
//! the cache. The shape is part of the key, so the outcome is a function of
//! the key alone: a faulty registration in one registry never poisons the
//! entry another registry's shape would build for the same handler type.
//!
//! # Concurrency
//!
//! Lookups take a read lock. A miss builds the entry outside the lock and
//! then inserts it under the write lock with `entry().or_insert`, so when two
//! callers race on a new key both builds run, the first insert wins and every
//! caller gets the winning entry. Builds are pure, which makes the lost
//! update harmless.

use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::capability::CapabilityDescriptor;
use crate::error::{InvalidHandlerShape, ShapeDefect};
use crate::registry::ResolvedHandler;
use crate::shape::{Invoker, ShapeId};

/// A cache entry: the selected invoker, or the permanent shape failure.
pub type CachedInvoker = Result<Invoker, InvalidHandlerShape>;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct InvokerKey {
    handler: TypeId,
    shape: ShapeId,
    capability: CapabilityDescriptor,
}

/// Counters describing cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries, failures included.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Entries built on a miss. Racing builds for the same key are all counted.
    pub builds: u64,
}

/// Concurrency-safe cache of type-erased invokers.
///
/// Share one instance between dispatchers with `Arc<InvocationCache>`.
#[derive(Default)]
pub struct InvocationCache {
    entries: RwLock<HashMap<InvokerKey, CachedInvoker>>,
    hits: AtomicU64,
    builds: AtomicU64,
}

impl InvocationCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the invoker serving `capability` on `handler`, building it on first use.
    pub fn get_or_build(
        &self,
        handler: &ResolvedHandler,
        capability: &CapabilityDescriptor,
    ) -> CachedInvoker {
        let key = InvokerKey {
            handler: handler.runtime_type(),
            shape: handler.shape().id(),
            capability: *capability,
        };

        if let Some(cached) = self.entries.read().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }

        let built = Self::build(handler, capability);
        self.builds.fetch_add(1, Ordering::Relaxed);

        match self.entries.write().entry(key) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                debug!(
                    handler = %handler.handler_type(),
                    capability = %capability,
                    valid = built.is_ok(),
                    "Cached handler invoker"
                );
                slot.insert(built).clone()
            }
        }
    }

    /// Selects the invoker for `capability` from the handler's shape.
    fn build(handler: &ResolvedHandler, capability: &CapabilityDescriptor) -> CachedInvoker {
        let shape = handler.shape();
        let invalid = |defect| InvalidHandlerShape::new(shape.handler_type(), *capability, defect);

        if shape.handler_type().id() != handler.runtime_type() {
            return Err(invalid(ShapeDefect::TypeMismatch));
        }

        shape
            .operation(capability)
            .cloned()
            .ok_or_else(|| invalid(ShapeDefect::MissingCapability))
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns a snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for InvocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerResult;
    use crate::handler::{NotificationHandler, RequestHandler};
    use crate::message::{Notification, Request};
    use crate::shape::HandlerShape;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct Double(u32);

    impl Request for Double {
        type Response = u32;
    }

    struct Halve(u32);

    impl Request for Halve {
        type Response = u32;
    }

    struct Reset;

    impl Notification for Reset {}

    struct Calculator;

    #[async_trait]
    impl RequestHandler<Double> for Calculator {
        async fn handle(&self, request: &Double, _: CancellationToken) -> HandlerResult<u32> {
            Ok(request.0 * 2)
        }
    }

    #[async_trait]
    impl RequestHandler<Halve> for Calculator {
        async fn handle(&self, request: &Halve, _: CancellationToken) -> HandlerResult<u32> {
            Ok(request.0 / 2)
        }
    }

    #[async_trait]
    impl NotificationHandler<Reset> for Calculator {
        async fn handle(&self, _: &Reset, _: CancellationToken) -> HandlerResult<()> {
            Ok(())
        }
    }

    fn calculator() -> ResolvedHandler {
        ResolvedHandler::from_handler(
            Calculator,
            HandlerShape::builder::<Calculator>()
                .request::<Double>()
                .request::<Halve>()
                .build(),
        )
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = InvocationCache::new();
        let handler = calculator();
        let capability = CapabilityDescriptor::request::<Double>();

        let first = cache.get_or_build(&handler, &capability).unwrap();
        let second = cache.get_or_build(&handler, &capability).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                hits: 1,
                builds: 1
            }
        );
    }

    #[test]
    fn test_capabilities_of_one_type_are_cached_separately() {
        let cache = InvocationCache::new();
        let handler = calculator();

        let double = cache
            .get_or_build(&handler, &CapabilityDescriptor::request::<Double>())
            .unwrap();
        let halve = cache
            .get_or_build(&handler, &CapabilityDescriptor::request::<Halve>())
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(double.capability(), CapabilityDescriptor::request::<Double>());
        assert_eq!(halve.capability(), CapabilityDescriptor::request::<Halve>());
    }

    #[test]
    fn test_missing_capability_is_cached_as_failure() {
        let cache = InvocationCache::new();
        let handler = calculator();
        let capability = CapabilityDescriptor::notification::<Reset>();

        let Err(err) = cache.get_or_build(&handler, &capability) else {
            panic!("a handler without Reset must not build an invoker");
        };
        assert_eq!(err.defect, ShapeDefect::MissingCapability);
        assert!(err.handler.is::<Calculator>());

        let Err(again) = cache.get_or_build(&handler, &capability) else {
            panic!("the cached failure must be returned again");
        };
        assert_eq!(again.defect, ShapeDefect::MissingCapability);
        assert_eq!(cache.stats().builds, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_shape_of_another_type_is_rejected() {
        let cache = InvocationCache::new();
        let handler = ResolvedHandler::from_handler(
            String::from("not a calculator"),
            HandlerShape::for_request::<Calculator, Double>(),
        );

        let Err(err) = cache.get_or_build(&handler, &CapabilityDescriptor::request::<Double>())
        else {
            panic!("a String instance must not use a Calculator shape");
        };
        assert_eq!(err.defect, ShapeDefect::TypeMismatch);
    }

    #[test]
    fn test_failure_for_one_shape_does_not_leak_to_another() {
        let cache = InvocationCache::new();
        let capability = CapabilityDescriptor::request::<Double>();
        let empty =
            ResolvedHandler::from_handler(Calculator, HandlerShape::builder::<Calculator>().build());

        assert!(cache.get_or_build(&empty, &capability).is_err());
        assert!(cache.get_or_build(&calculator(), &capability).is_ok());
        assert!(cache.get_or_build(&empty, &capability).is_err());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_cached_and_fresh_invokers_agree() {
        let cache = InvocationCache::new();
        let handler = calculator();
        let capability = CapabilityDescriptor::request::<Double>();

        cache.get_or_build(&handler, &capability).unwrap();
        let cached = cache.get_or_build(&handler, &capability).unwrap();
        let fresh = InvocationCache::new()
            .get_or_build(&handler, &capability)
            .unwrap();

        let request = Double(21);
        let a = cached
            .invoke(handler.instance().as_ref(), &request, CancellationToken::new())
            .await
            .unwrap();
        let b = fresh
            .invoke(handler.instance().as_ref(), &request, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*a.downcast::<u32>().unwrap(), 42);
        assert_eq!(*b.downcast::<u32>().unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_builds_settle_on_one_entry() {
        let cache = Arc::new(InvocationCache::new());
        let capability = CapabilityDescriptor::request::<Halve>();
        let handler = calculator();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let handler = handler.clone();
                tokio::spawn(async move { cache.get_or_build(&handler, &capability) })
            })
            .collect();

        let mut invokers = Vec::new();
        for task in tasks {
            invokers.push(task.await.unwrap().unwrap());
        }

        assert_eq!(cache.len(), 1);
        let winner = cache.get_or_build(&handler, &capability).unwrap();
        assert!(invokers.iter().any(|invoker| Arc::ptr_eq(invoker, &winner)));
        assert!(cache.stats().builds >= 1);
    }
}
