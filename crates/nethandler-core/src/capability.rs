//! Capability descriptors.
//!
//! A capability descriptor identifies which handler(s) apply to a message:
//! the (request type, response type) pair for requests, or the notification
//! type for notifications. Descriptors are the keys handler registries are
//! queried with, and they name the missing piece in every dispatch error.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::message::{Notification, Request};

// =============================================================================
// TypeKey
// =============================================================================

/// A stable runtime type identifier paired with its diagnostic name.
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for
/// error messages and logs.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Returns the underlying [`TypeId`].
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type name with every module path stripped.
    pub fn short_name(&self) -> String {
        short_type_name(self.name)
    }

    /// Returns `true` if this key identifies `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// Strips module paths from every path segment of a type name.
///
/// `core::option::Option<alloc::string::String>` becomes `Option<String>`.
fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment_start = 0;
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            out.truncate(segment_start);
        } else {
            out.push(c);
            if !(c.is_alphanumeric() || c == '_') {
                segment_start = out.len();
            }
        }
    }

    out
}

// =============================================================================
// CapabilityDescriptor
// =============================================================================

/// Which kind of capability a descriptor names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// Request/response: exactly one handler.
    Request,
    /// Notification: zero or more handlers.
    Notification,
}

/// Identifies the handler capability a message needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityDescriptor {
    /// A request type and the response type it declares.
    Request {
        /// The concrete request type.
        request: TypeKey,
        /// The response type declared by the request.
        response: TypeKey,
    },
    /// A notification type.
    Notification {
        /// The concrete notification type.
        notification: TypeKey,
    },
}

impl CapabilityDescriptor {
    /// Returns the descriptor for request type `R`.
    pub fn request<R: Request>() -> Self {
        Self::Request {
            request: TypeKey::of::<R>(),
            response: TypeKey::of::<R::Response>(),
        }
    }

    /// Returns the descriptor for notification type `N`.
    pub fn notification<N: Notification>() -> Self {
        Self::Notification {
            notification: TypeKey::of::<N>(),
        }
    }

    /// Returns the capability kind.
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Request { .. } => CapabilityKind::Request,
            Self::Notification { .. } => CapabilityKind::Notification,
        }
    }

    /// Returns the request or notification type.
    pub fn message_type(&self) -> TypeKey {
        match self {
            Self::Request { request, .. } => *request,
            Self::Notification { notification } => *notification,
        }
    }

    /// Returns the declared response type, if this is a request capability.
    pub fn response_type(&self) -> Option<TypeKey> {
        match self {
            Self::Request { response, .. } => Some(*response),
            Self::Notification { .. } => None,
        }
    }
}

impl fmt::Display for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { request, response } => {
                write!(f, "RequestHandler<{request}, {response}>")
            }
            Self::Notification { notification } => {
                write!(f, "NotificationHandler<{notification}>")
            }
        }
    }
}
