//! The handler registry seam.
//!
//! The dispatcher never references handlers directly. It asks a
//! [`HandlerRegistry`] for the instances registered under a
//! [`CapabilityDescriptor`]; the registry owns registration, lifetimes and
//! cardinality. `nethandler-runtime` ships an in-memory container, but any
//! dependency-injection style container can implement this trait.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::capability::{CapabilityDescriptor, TypeKey};
use crate::shape::{AnyHandler, HandlerShape};

/// A handler instance together with the shape of its concrete type.
#[derive(Clone)]
pub struct ResolvedHandler {
    instance: AnyHandler,
    shape: HandlerShape,
}

impl ResolvedHandler {
    /// Pairs an instance with its shape.
    pub fn new(instance: AnyHandler, shape: HandlerShape) -> Self {
        Self { instance, shape }
    }

    /// Wraps a concrete handler value.
    pub fn from_handler<H: Any + Send + Sync>(handler: H, shape: HandlerShape) -> Self {
        Self::new(Arc::new(handler), shape)
    }

    /// Returns the type-erased instance.
    pub fn instance(&self) -> &AnyHandler {
        &self.instance
    }

    /// Returns the shape registered for the instance.
    pub fn shape(&self) -> &HandlerShape {
        &self.shape
    }

    /// Returns the runtime type of the instance itself.
    ///
    /// This is read from the instance, not from the shape, so a shape that
    /// was registered for another type is detectable.
    pub fn runtime_type(&self) -> TypeId {
        (*self.instance).type_id()
    }

    /// Returns the handler type declared by the shape.
    pub fn handler_type(&self) -> TypeKey {
        self.shape.handler_type()
    }
}

impl std::fmt::Debug for ResolvedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedHandler")
            .field("handler", &self.shape.handler_type())
            .finish_non_exhaustive()
    }
}

/// Resolves handler instances by capability.
pub trait HandlerRegistry: Send + Sync {
    /// Resolves the single handler for a request capability.
    ///
    /// Returns `None` when nothing is registered.
    fn resolve_one(&self, capability: &CapabilityDescriptor) -> Option<ResolvedHandler>;

    /// Resolves every handler for a notification capability, in registry order.
    fn resolve_all(&self, capability: &CapabilityDescriptor) -> Vec<ResolvedHandler>;
}

impl<T: HandlerRegistry + ?Sized> HandlerRegistry for Arc<T> {
    fn resolve_one(&self, capability: &CapabilityDescriptor) -> Option<ResolvedHandler> {
        (**self).resolve_one(capability)
    }

    fn resolve_all(&self, capability: &CapabilityDescriptor) -> Vec<ResolvedHandler> {
        (**self).resolve_all(capability)
    }
}

/// A registry that resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRegistry;

impl HandlerRegistry for EmptyRegistry {
    fn resolve_one(&self, _capability: &CapabilityDescriptor) -> Option<ResolvedHandler> {
        None
    }

    fn resolve_all(&self, _capability: &CapabilityDescriptor) -> Vec<ResolvedHandler> {
        Vec::new()
    }
}
