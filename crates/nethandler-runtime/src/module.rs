//! Handler modules.
//!
//! A module groups the registrations of one feature area so an application
//! can install them in one call:
//!
//! ```rust,ignore
//! struct BillingModule;
//!
//! impl HandlerModule for BillingModule {
//!     fn name(&self) -> &str {
//!         "billing"
//!     }
//!
//!     fn register(&self, services: &mut ServiceCollection) {
//!         services
//!             .add_request_handler::<CreateInvoice, _>(InvoiceHandler::default())
//!             .add_notification_handler::<InvoicePaid, _>(ReceiptMailer);
//!     }
//! }
//!
//! services.add_module(&BillingModule);
//! ```

use crate::container::ServiceCollection;

/// A batch of handler registrations.
pub trait HandlerModule: Send + Sync {
    /// Name used in logs. Defaults to the type name.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Adds this module's handlers to `services`.
    fn register(&self, services: &mut ServiceCollection);
}

impl<M: HandlerModule + ?Sized> HandlerModule for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn register(&self, services: &mut ServiceCollection) {
        (**self).register(services)
    }
}

/// A [`HandlerModule`] backed by a closure. Created by [`module_fn`].
pub struct FnModule<F> {
    name: &'static str,
    register: F,
}

/// Turns a closure into a named [`HandlerModule`].
pub fn module_fn<F>(name: &'static str, register: F) -> FnModule<F>
where
    F: Fn(&mut ServiceCollection) + Send + Sync,
{
    FnModule { name, register }
}

impl<F> HandlerModule for FnModule<F>
where
    F: Fn(&mut ServiceCollection) + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn register(&self, services: &mut ServiceCollection) {
        (self.register)(services)
    }
}
