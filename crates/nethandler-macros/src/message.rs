//! Message derive macro implementations.
//!
//! # `#[request(...)]`
//!
//! | Key | Example | Required | Description |
//! |-----|---------|----------|-------------|
//! | `response` | `String` | **Yes** | The response type the handler produces |
//! | `crate` | `::nethandler_core` | No | Path to the core crate (default `::nethandler::core`) |
//!
//! # `#[notification(...)]`
//!
//! | Key | Example | Required | Description |
//! |-----|---------|----------|-------------|
//! | `crate` | `::nethandler_core` | No | Path to the core crate |

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Path, Type, parse_quote, spanned::Spanned};

pub fn derive_request(input: &DeriveInput) -> syn::Result<TokenStream> {
    reject_union(input, "Request")?;

    let mut response: Option<Type> = None;
    let mut krate: Option<Path> = None;

    for attr in attrs_named(&input.attrs, "request") {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("response") {
                response = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("crate") {
                krate = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unknown `request` key, expected `response` or `crate`"));
            }
            Ok(())
        })?;
    }

    let response = response.ok_or_else(|| {
        syn::Error::new(
            input.ident.span(),
            "#[derive(Request)] requires `#[request(response = Type)]`",
        )
    })?;
    let krate = krate.unwrap_or_else(default_crate_path);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::Request for #name #ty_generics #where_clause {
            type Response = #response;
        }
    })
}

pub fn derive_notification(input: &DeriveInput) -> syn::Result<TokenStream> {
    reject_union(input, "Notification")?;

    let mut krate: Option<Path> = None;

    for attr in attrs_named(&input.attrs, "notification") {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                krate = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unknown `notification` key, expected `crate`"))
            }
        })?;
    }

    let krate = krate.unwrap_or_else(default_crate_path);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::Notification for #name #ty_generics #where_clause {}
    })
}

fn default_crate_path() -> Path {
    parse_quote!(::nethandler::core)
}

fn attrs_named<'a>(attrs: &'a [Attribute], name: &'a str) -> impl Iterator<Item = &'a Attribute> {
    attrs.iter().filter(move |attr| attr.path().is_ident(name))
}

fn reject_union(input: &DeriveInput, derive: &str) -> syn::Result<()> {
    match &input.data {
        Data::Union(_) => Err(syn::Error::new(
            input.span(),
            format!("{derive} cannot be derived for unions"),
        )),
        Data::Struct(_) | Data::Enum(_) => Ok(()),
    }
}
