//! Procedural macros for NetHandler.
//!
//! This crate provides:
//!
//! - `#[derive(Request)]` - implements `Request` with the response from `#[request(response = T)]`
//! - `#[derive(Notification)]` - implements the `Notification` marker
//!
//! The generated impls name `::nethandler::core` by default. Crates that
//! depend on `nethandler-core` directly pass `crate = ::nethandler_core`.

mod message;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `Request` for a struct or enum.
///
/// # Attributes
///
/// - `#[request(response = Type)]` - the response type (required)
/// - `#[request(crate = path)]` - path to the core crate
///
/// # Example
///
/// ```rust,ignore
/// use nethandler::prelude::*;
///
/// #[derive(Request)]
/// #[request(response = Option<User>)]
/// pub struct FindUser {
///     pub id: u64,
/// }
/// ```
#[proc_macro_derive(Request, attributes(request))]
pub fn derive_request(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match message::derive_request(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives `Notification` for a struct or enum.
///
/// # Example
///
/// ```rust,ignore
/// use nethandler::prelude::*;
///
/// #[derive(Notification)]
/// pub struct UserCreated {
///     pub id: u64,
/// }
/// ```
#[proc_macro_derive(Notification, attributes(notification))]
pub fn derive_notification(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match message::derive_notification(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
