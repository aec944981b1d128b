//! Pricing Authority Engine
//!
//! Server-side implementation of the authority: holds carts keyed by cart id,
//! prices them against the catalog, validates coupons and turns carts into
//! orders. Exposed over HTTP by [`crate::router`] and in-process by
//! [`crate::authority::LocalAuthority`].

use thiserror::Error;

use crate::cart::models::ProductId;

pub mod catalog;
pub mod engine;

pub use catalog::{Catalog, CatalogError, Product};
pub use engine::{PricingEngine, PricingRules, SharedEngine};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Item not in cart: {0}")]
    NotInCart(ProductId),

    #[error("Product out of stock: {0}")]
    OutOfStock(ProductId),

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Cart cannot hold more than {} units", u32::MAX)]
    QuantityTooLarge,

    #[error("Invalid {field}: {value}")]
    InvalidOption { field: &'static str, value: String },

    #[error("Cart version {current} does not match base version {expected}")]
    VersionConflict { expected: u64, current: u64 },

    #[error("Cart is empty")]
    CartEmpty,

    #[error("Missing required address fields: {}", .0.join(", "))]
    InvalidAddress(Vec<String>),

    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),
}

impl PricingError {
    /// HTTP status the authority answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ProductNotFound(_) | Self::NotInCart(_) => 404,
            Self::VersionConflict { .. } => 409,
            Self::CartEmpty => 400,
            Self::OutOfStock(_)
            | Self::InvalidQuantity
            | Self::QuantityTooLarge
            | Self::InvalidOption { .. }
            | Self::InvalidAddress(_)
            | Self::InvalidPaymentMethod(_) => 422,
        }
    }
}
