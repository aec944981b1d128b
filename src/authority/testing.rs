//! # Scripted Authority
//!
//! Test double that forwards to a real in-process engine but lets a test
//! inject failures, latency and canned responses per RPC, and inspect which
//! calls were made.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    AddItemRequest, AuthorityError, AuthorityResult, LocalAuthority, PricingAuthority,
    UpdateItemRequest,
};
use crate::cart::models::{CartSnapshot, ProductId};
use crate::checkout::coupon::{CouponOffer, CouponVerdict};
use crate::checkout::models::{CheckoutRequest, Order};
use crate::pricing::{Catalog, PricingEngine, PricingRules, SharedEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rpc {
    GetCart,
    AddItem,
    RemoveItem,
    UpdateItem,
    ClearCart,
    ValidateCoupon,
    ListCoupons,
    Checkout,
}

/// Catalog used across unit tests.
///
/// - 1: Linen Shirt, 1299, 10% off
/// - 2: Canvas Tote, 450
/// - 3: Wool Scarf, 299
pub fn fixture_catalog() -> Catalog {
    Catalog::from_json(
        r#"{"products": [
            {"id": 1, "name": "Linen Shirt", "price": 1299, "discount": 10,
             "sizes": ["S", "M", "L"], "colors": ["Black", "White"]},
            {"id": 2, "name": "Canvas Tote", "price": 450,
             "sizes": ["M"], "colors": ["Black", "Natural"]},
            {"id": 3, "name": "Wool Scarf", "price": 299}
        ]}"#,
    )
    .expect("fixture catalog is valid")
}

pub fn fixture_engine() -> SharedEngine {
    let engine = PricingEngine::new(fixture_catalog(), PricingRules::default());
    Arc::new(engine)
}

#[derive(Default)]
struct Script {
    failures: HashMap<Rpc, AuthorityError>,
    delays: HashMap<Rpc, Duration>,
    canned: HashMap<Rpc, CartSnapshot>,
    verdict: Option<CouponVerdict>,
    calls: Vec<Rpc>,
}

pub struct ScriptedAuthority {
    inner: LocalAuthority,
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedAuthority {
    pub fn new(engine: SharedEngine) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalAuthority::new(engine, "test-cart"),
            script: Mutex::new(Script::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn with_fixtures() -> Arc<Self> {
        Self::new(fixture_engine())
    }

    /// Direct access to the backing authority, bypassing the script.
    pub fn backend(&self) -> &LocalAuthority {
        &self.inner
    }

    /// Every subsequent `rpc` call fails with `err` until [`Self::recover`].
    pub fn fail(&self, rpc: Rpc, err: AuthorityError) {
        self.script.lock().unwrap().failures.insert(rpc, err);
    }

    pub fn recover(&self, rpc: Rpc) {
        self.script.lock().unwrap().failures.remove(&rpc);
    }

    pub fn delay(&self, rpc: Rpc, delay: Duration) {
        self.script.lock().unwrap().delays.insert(rpc, delay);
    }

    /// The next `rpc` call answers `snapshot` instead of reaching the engine.
    pub fn respond_once(&self, rpc: Rpc, snapshot: CartSnapshot) {
        self.script.lock().unwrap().canned.insert(rpc, snapshot);
    }

    /// The next coupon lookup answers `verdict` instead of reaching the engine.
    pub fn verdict_once(&self, verdict: CouponVerdict) {
        self.script.lock().unwrap().verdict = Some(verdict);
    }

    pub fn calls(&self) -> Vec<Rpc> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, rpc: Rpc) -> usize {
        let script = self.script.lock().unwrap();
        script.calls.iter().filter(|c| **c == rpc).count()
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, rpc: Rpc) -> AuthorityResult<(InFlight<'_>, Option<CartSnapshot>)> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let delay = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(rpc);
            script.delays.get(&rpc).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        if let Some(err) = script.failures.get(&rpc) {
            return Err(err.clone());
        }
        Ok((guard, script.canned.remove(&rpc)))
    }
}

#[async_trait]
impl PricingAuthority for ScriptedAuthority {
    async fn get_cart(&self) -> AuthorityResult<CartSnapshot> {
        let (_guard, canned) = self.enter(Rpc::GetCart).await?;
        match canned {
            Some(snapshot) => Ok(snapshot),
            None => self.inner.get_cart().await,
        }
    }

    async fn add_item(&self, request: AddItemRequest) -> AuthorityResult<CartSnapshot> {
        let (_guard, canned) = self.enter(Rpc::AddItem).await?;
        match canned {
            Some(snapshot) => Ok(snapshot),
            None => self.inner.add_item(request).await,
        }
    }

    async fn remove_item(&self, product_id: ProductId) -> AuthorityResult<CartSnapshot> {
        let (_guard, canned) = self.enter(Rpc::RemoveItem).await?;
        match canned {
            Some(snapshot) => Ok(snapshot),
            None => self.inner.remove_item(product_id).await,
        }
    }

    async fn update_item(
        &self,
        product_id: ProductId,
        request: UpdateItemRequest,
    ) -> AuthorityResult<CartSnapshot> {
        let (_guard, canned) = self.enter(Rpc::UpdateItem).await?;
        match canned {
            Some(snapshot) => Ok(snapshot),
            None => self.inner.update_item(product_id, request).await,
        }
    }

    async fn clear_cart(&self) -> AuthorityResult<CartSnapshot> {
        let (_guard, canned) = self.enter(Rpc::ClearCart).await?;
        match canned {
            Some(snapshot) => Ok(snapshot),
            None => self.inner.clear_cart().await,
        }
    }

    async fn validate_coupon(&self, code: &str) -> AuthorityResult<CouponVerdict> {
        let _guard = self.enter(Rpc::ValidateCoupon).await?;
        let canned = self.script.lock().unwrap().verdict.take();
        match canned {
            Some(verdict) => Ok(verdict),
            None => self.inner.validate_coupon(code).await,
        }
    }

    async fn list_coupons(&self) -> AuthorityResult<Vec<CouponOffer>> {
        let _guard = self.enter(Rpc::ListCoupons).await?;
        self.inner.list_coupons().await
    }

    async fn checkout(&self, request: CheckoutRequest) -> AuthorityResult<Order> {
        let _guard = self.enter(Rpc::Checkout).await?;
        self.inner.checkout(request).await
    }
}
