//! Pricing Authority Module
//!
//! The authority is the sole source of truth for cart contents, prices and
//! orders. This module defines the RPC seam the client-side engine talks
//! through, plus two implementations:
//! - [`HttpAuthority`] - JSON over HTTP against the authority service
//! - [`LocalAuthority`] - in-process adapter over the pricing engine

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use thiserror::Error;

use crate::cart::models::{CartSnapshot, ProductId};
use crate::checkout::coupon::{CouponOffer, CouponVerdict};
use crate::checkout::models::{CheckoutRequest, Order};

pub mod http;
pub mod local;
#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpAuthority;
pub use local::LocalAuthority;

// =============================================================================
// Wire Payloads
// =============================================================================

/// Body of `AddItem`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub size: String,
    pub color: String,
}

/// Body of `UpdateItem`. `base_version` is the snapshot version the new
/// quantity was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
    pub size: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("request to pricing authority timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authority rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The request was computed against an outdated cart version.
    #[error("cart changed concurrently: {detail}")]
    Conflict { detail: String },

    #[error("malformed authority response: {0}")]
    Decode(String),
}

pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// Bounds `future` by `limit`; expiry becomes [`AuthorityError::Timeout`].
pub async fn with_deadline<T, F>(limit: Duration, future: F) -> AuthorityResult<T>
where
    F: Future<Output = AuthorityResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(AuthorityError::Timeout),
    }
}

// =============================================================================
// The Seam
// =============================================================================

/// Remote pricing and order authority.
#[async_trait]
pub trait PricingAuthority: Send + Sync {
    async fn get_cart(&self) -> AuthorityResult<CartSnapshot>;

    async fn add_item(&self, request: AddItemRequest) -> AuthorityResult<CartSnapshot>;

    async fn remove_item(&self, product_id: ProductId) -> AuthorityResult<CartSnapshot>;

    async fn update_item(
        &self,
        product_id: ProductId,
        request: UpdateItemRequest,
    ) -> AuthorityResult<CartSnapshot>;

    async fn clear_cart(&self) -> AuthorityResult<CartSnapshot>;

    async fn validate_coupon(&self, code: &str) -> AuthorityResult<CouponVerdict>;

    async fn list_coupons(&self) -> AuthorityResult<Vec<CouponOffer>>;

    async fn checkout(&self, request: CheckoutRequest) -> AuthorityResult<Order>;
}
