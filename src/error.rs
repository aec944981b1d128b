//! Error types shared by the cart store and the checkout flow
//!
//! Every failure in the client-side engine is recoverable: the store keeps its
//! previous snapshot and the checkout session keeps the user's input.

use thiserror::Error;

use crate::authority::AuthorityError;

/// User-facing failure kinds of the cart engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartError {
    /// Read-path failure (load, coupon lookup). Nothing changed locally.
    #[error("failed to fetch cart: {0}")]
    FetchFailed(String),

    /// Write-path failure. The previous snapshot is still authoritative.
    #[error("cart update failed: {0}")]
    MutationFailed(String),

    /// A local precondition did not hold; the authority was not contacted.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The authority reported the coupon as invalid or expired.
    #[error("coupon rejected: {0}")]
    CouponRejected(String),

    /// The authority refused or could not process the order.
    #[error("checkout failed: {0}")]
    CheckoutFailed(String),

    /// Checkout cannot start on an empty cart.
    #[error("your cart is empty")]
    CartEmpty,

    #[error("invalid checkout transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl CartError {
    pub(crate) fn fetch(err: AuthorityError) -> Self {
        Self::FetchFailed(err.to_string())
    }

    pub(crate) fn mutation(err: AuthorityError) -> Self {
        Self::MutationFailed(err.to_string())
    }
}

pub type CartResult<T> = Result<T, CartError>;
