//! Handler shapes and type-erased invokers.
//!
//! A [`HandlerShape`] records, for one concrete handler type, which
//! capabilities it implements and the operation adapter that serves each of
//! them. Registries attach a shape to every handler instance they hand out;
//! the [`InvocationCache`](crate::InvocationCache) consults it once per
//! (handler type, shape, capability) and keeps the selected [`Invoker`].
//!
//! Shapes are assembled with a typed builder, so a capability can only be
//! declared for a handler type that really implements it:
//!
//! ```rust,ignore
//! let shape = HandlerShape::builder::<AuditLog>()
//!     .request::<FetchAudit>()
//!     .notification::<UserCreated>()
//!     .build();
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::capability::{CapabilityDescriptor, TypeKey};
use crate::error::{DispatchResult, HandlerFailure, InvalidHandlerShape, ShapeDefect};
use crate::handler::{NotificationHandler, RequestHandler};
use crate::message::{Notification, Request};

/// A type-erased handler instance.
pub type AnyHandler = Arc<dyn Any + Send + Sync>;

/// The type-erased value produced by an invoker.
///
/// Request invokers box the handler's response; notification invokers box `()`.
pub type ErasedResponse = Box<dyn Any + Send>;

/// A shared, type-erased invoker.
pub type Invoker = Arc<dyn ErasedInvoker>;

// ============================================================================
// ErasedInvoker
// ============================================================================

/// Calls one handler operation through type-erased references.
///
/// Invoking is semantically identical to calling the handler's operation
/// directly: the adapter downcasts the instance and message, awaits the
/// operation and boxes its result.
pub trait ErasedInvoker: Send + Sync {
    /// The capability this invoker serves.
    fn capability(&self) -> CapabilityDescriptor;

    /// The concrete handler type this invoker expects.
    fn handler_type(&self) -> TypeKey;

    /// Runs the operation on `handler` with `message`.
    fn invoke<'a>(
        &'a self,
        handler: &'a (dyn Any + Send + Sync),
        message: &'a (dyn Any + Send + Sync),
        cancellation: CancellationToken,
    ) -> BoxFuture<'a, DispatchResult<ErasedResponse>>;
}

struct RequestInvoker<H, R> {
    _marker: PhantomData<fn() -> (H, R)>,
}

impl<H, R> ErasedInvoker for RequestInvoker<H, R>
where
    H: RequestHandler<R>,
    R: Request,
{
    fn capability(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::request::<R>()
    }

    fn handler_type(&self) -> TypeKey {
        TypeKey::of::<H>()
    }

    fn invoke<'a>(
        &'a self,
        handler: &'a (dyn Any + Send + Sync),
        message: &'a (dyn Any + Send + Sync),
        cancellation: CancellationToken,
    ) -> BoxFuture<'a, DispatchResult<ErasedResponse>> {
        Box::pin(invoke_request::<H, R>(handler, message, cancellation))
    }
}

struct NotificationInvoker<H, N> {
    _marker: PhantomData<fn() -> (H, N)>,
}

impl<H, N> ErasedInvoker for NotificationInvoker<H, N>
where
    H: NotificationHandler<N>,
    N: Notification,
{
    fn capability(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::notification::<N>()
    }

    fn handler_type(&self) -> TypeKey {
        TypeKey::of::<H>()
    }

    fn invoke<'a>(
        &'a self,
        handler: &'a (dyn Any + Send + Sync),
        message: &'a (dyn Any + Send + Sync),
        cancellation: CancellationToken,
    ) -> BoxFuture<'a, DispatchResult<ErasedResponse>> {
        Box::pin(invoke_notification::<H, N>(handler, message, cancellation))
    }
}

async fn invoke_request<H, R>(
    handler: &(dyn Any + Send + Sync),
    message: &(dyn Any + Send + Sync),
    cancellation: CancellationToken,
) -> DispatchResult<ErasedResponse>
where
    H: RequestHandler<R>,
    R: Request,
{
    let (Some(handler), Some(request)) = (handler.downcast_ref::<H>(), message.downcast_ref::<R>())
    else {
        return Err(type_mismatch::<H>(CapabilityDescriptor::request::<R>()).into());
    };

    let response = handler
        .handle(request, cancellation)
        .await
        .map_err(|source| HandlerFailure::new(TypeKey::of::<H>(), source))?;

    Ok(Box::new(response))
}

async fn invoke_notification<H, N>(
    handler: &(dyn Any + Send + Sync),
    message: &(dyn Any + Send + Sync),
    cancellation: CancellationToken,
) -> DispatchResult<ErasedResponse>
where
    H: NotificationHandler<N>,
    N: Notification,
{
    let (Some(handler), Some(notification)) =
        (handler.downcast_ref::<H>(), message.downcast_ref::<N>())
    else {
        return Err(type_mismatch::<H>(CapabilityDescriptor::notification::<N>()).into());
    };

    handler
        .handle(notification, cancellation)
        .await
        .map_err(|source| HandlerFailure::new(TypeKey::of::<H>(), source))?;

    Ok(Box::new(()))
}

fn type_mismatch<H: 'static>(capability: CapabilityDescriptor) -> InvalidHandlerShape {
    InvalidHandlerShape::new(TypeKey::of::<H>(), capability, ShapeDefect::TypeMismatch)
}

// ============================================================================
// HandlerShape
// ============================================================================

/// Identifies one built [`HandlerShape`].
///
/// Clones of a shape keep its id; every call to [`ShapeBuilder::build`]
/// yields a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(u64);

static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(0);

/// The capabilities one concrete handler type implements.
#[derive(Clone)]
pub struct HandlerShape {
    id: ShapeId,
    handler: TypeKey,
    operations: Arc<[Invoker]>,
}

impl HandlerShape {
    /// Starts building the shape of handler type `H`.
    pub fn builder<H: Any + Send + Sync>() -> ShapeBuilder<H> {
        ShapeBuilder {
            operations: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Returns the shape of a request handler serving only `R`.
    pub fn for_request<H, R>() -> Self
    where
        H: RequestHandler<R>,
        R: Request,
    {
        Self::builder::<H>().request::<R>().build()
    }

    /// Returns the shape of a notification handler observing only `N`.
    pub fn for_notification<H, N>() -> Self
    where
        H: NotificationHandler<N>,
        N: Notification,
    {
        Self::builder::<H>().notification::<N>().build()
    }

    /// Returns the identity of this shape.
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Returns the concrete handler type this shape describes.
    pub fn handler_type(&self) -> TypeKey {
        self.handler
    }

    /// Returns every capability the handler declares, in declaration order.
    pub fn capabilities(&self) -> impl Iterator<Item = CapabilityDescriptor> + '_ {
        self.operations.iter().map(|op| op.capability())
    }

    /// Returns `true` if the handler declares `capability`.
    pub fn declares(&self, capability: &CapabilityDescriptor) -> bool {
        self.operation(capability).is_some()
    }

    /// Selects the operation serving `capability`.
    ///
    /// The first declared operation wins if a capability was declared twice.
    pub fn operation(&self, capability: &CapabilityDescriptor) -> Option<&Invoker> {
        self.operations
            .iter()
            .find(|op| op.capability() == *capability)
    }
}

impl std::fmt::Debug for HandlerShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerShape")
            .field("id", &self.id)
            .field("handler", &self.handler)
            .field("capabilities", &self.capabilities().collect::<Vec<_>>())
            .finish()
    }
}

/// Typed builder for [`HandlerShape`].
pub struct ShapeBuilder<H> {
    operations: Vec<Invoker>,
    _marker: PhantomData<fn() -> H>,
}

impl<H: Any + Send + Sync> ShapeBuilder<H> {
    /// Declares that `H` handles request `R`.
    pub fn request<R>(mut self) -> Self
    where
        H: RequestHandler<R>,
        R: Request,
    {
        self.operations.push(Arc::new(RequestInvoker::<H, R> {
            _marker: PhantomData,
        }));
        self
    }

    /// Declares that `H` observes notification `N`.
    pub fn notification<N>(mut self) -> Self
    where
        H: NotificationHandler<N>,
        N: Notification,
    {
        self.operations.push(Arc::new(NotificationInvoker::<H, N> {
            _marker: PhantomData,
        }));
        self
    }

    /// Finishes the shape.
    pub fn build(self) -> HandlerShape {
        HandlerShape {
            id: ShapeId(NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed)),
            handler: TypeKey::of::<H>(),
            operations: self.operations.into(),
        }
    }
}
