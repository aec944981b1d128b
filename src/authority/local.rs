//! In-process authority backed directly by a [`PricingEngine`].

use async_trait::async_trait;
use std::sync::Arc;

use super::{AddItemRequest, AuthorityError, AuthorityResult, PricingAuthority, UpdateItemRequest};
use crate::cart::models::{CartSnapshot, ProductId};
use crate::checkout::coupon::{CouponOffer, CouponVerdict};
use crate::checkout::models::{CheckoutRequest, Order};
use crate::pricing::{PricingError, SharedEngine};

/// Talks to a pricing engine living in the same process, bound to one cart.
#[derive(Clone)]
pub struct LocalAuthority {
    engine: SharedEngine,
    cart_id: Arc<str>,
}

impl LocalAuthority {
    pub fn new(engine: SharedEngine, cart_id: impl Into<Arc<str>>) -> Self {
        Self {
            engine,
            cart_id: cart_id.into(),
        }
    }

    pub fn cart_id(&self) -> &str {
        &self.cart_id
    }
}

impl From<PricingError> for AuthorityError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::VersionConflict { .. } => AuthorityError::Conflict {
                detail: err.to_string(),
            },
            other => AuthorityError::Rejected {
                status: other.status_code(),
                detail: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl PricingAuthority for LocalAuthority {
    async fn get_cart(&self) -> AuthorityResult<CartSnapshot> {
        Ok(self.engine.snapshot(&self.cart_id))
    }

    async fn add_item(&self, request: AddItemRequest) -> AuthorityResult<CartSnapshot> {
        Ok(self.engine.add(&self.cart_id, request)?)
    }

    async fn remove_item(&self, product_id: ProductId) -> AuthorityResult<CartSnapshot> {
        Ok(self.engine.remove(&self.cart_id, product_id))
    }

    async fn update_item(
        &self,
        product_id: ProductId,
        request: UpdateItemRequest,
    ) -> AuthorityResult<CartSnapshot> {
        Ok(self.engine.update(&self.cart_id, product_id, request)?)
    }

    async fn clear_cart(&self) -> AuthorityResult<CartSnapshot> {
        Ok(self.engine.clear(&self.cart_id))
    }

    async fn validate_coupon(&self, code: &str) -> AuthorityResult<CouponVerdict> {
        Ok(self.engine.validate_coupon(code))
    }

    async fn list_coupons(&self) -> AuthorityResult<Vec<CouponOffer>> {
        Ok(self.engine.coupons())
    }

    async fn checkout(&self, request: CheckoutRequest) -> AuthorityResult<Order> {
        Ok(self.engine.checkout(&self.cart_id, request)?)
    }
}
