//! Storefront Cart Library
//!
//! This library provides a client-side shopping cart and checkout engine that
//! mirrors a server-authoritative cart, plus the pricing authority service it
//! talks to.

// Domain modules
pub mod cart;
pub mod checkout;
pub mod pricing;

// Infrastructure
pub mod authority;
pub mod config;
pub mod error;
pub mod router;
pub mod storefront;

pub use error::{CartError, CartResult};
pub use storefront::Storefront;
