//! Composition root for the client-side engine.
//!
//! A [`Storefront`] owns the one [`CartStore`] of a shopper session and opens
//! checkout sessions against it. Nothing in the engine reaches for global
//! state; consumers receive the store handle from here.

use std::sync::Arc;
use tracing::info;

use crate::authority::{AuthorityError, HttpAuthority, LocalAuthority, PricingAuthority};
use crate::cart::helpers::get_or_create_cart_id;
use crate::cart::notify::{LogNotifier, Notifier};
use crate::cart::store::{CartStore, SharedCart};
use crate::checkout::{CheckoutAssembler, CouponMessages};
use crate::config::Config;
use crate::error::CartResult;
use crate::pricing::SharedEngine;

pub struct Storefront {
    cart: SharedCart,
    coupon_messages: CouponMessages,
}

impl Storefront {
    pub fn new(
        authority: Arc<dyn PricingAuthority>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            cart: Arc::new(CartStore::new(authority, notifier, config.request_timeout)),
            coupon_messages: CouponMessages::new(config.coupon_message_ttl),
        }
    }

    /// Talks to the authority at `config.authority_url`, logging notices.
    pub fn connect(config: &Config) -> Result<Self, AuthorityError> {
        let cart_id = get_or_create_cart_id(config.cart_id.clone());
        let authority = HttpAuthority::new(&config.authority_url, cart_id, config.request_timeout)?;
        info!(url = %authority.base_url(), cart_id = %authority.cart_id(), "Connected storefront");
        let notifier = Arc::new(LogNotifier);
        Ok(Self::new(Arc::new(authority), notifier, config))
    }

    /// Runs against an engine in the same process.
    pub fn in_process(engine: SharedEngine, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        let cart_id = get_or_create_cart_id(config.cart_id.clone());
        let authority = LocalAuthority::new(engine, cart_id);
        Self::new(Arc::new(authority), notifier, config)
    }

    pub fn cart(&self) -> SharedCart {
        Arc::clone(&self.cart)
    }

    pub fn coupon_messages(&self) -> &CouponMessages {
        &self.coupon_messages
    }

    /// Starts a checkout session over the current cart.
    pub fn checkout(&self) -> CartResult<CheckoutAssembler> {
        CheckoutAssembler::open(self.cart(), self.coupon_messages.clone())
    }
}
