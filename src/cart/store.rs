//! Client-side Cart Store
//!
//! [`CartStore`] owns the local mirror of the authoritative cart. Every
//! mutation is a request/replace cycle: the authority's answer replaces the
//! held snapshot wholesale, and a failure leaves it exactly as it was.
//!
//! Mutations are serialized through a single queue so that at most one is in
//! flight per store, and each `UpdateItem` carries the version it was computed
//! from so the authority can refuse stale writes.

use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::{watch, Mutex};
use tracing::{debug, instrument, warn};

use super::models::{CartSnapshot, ProductId, ProductSummary};
use super::notify::{Notice, Notifier};
use crate::authority::{
    with_deadline, AddItemRequest, AuthorityError, AuthorityResult, PricingAuthority,
    UpdateItemRequest,
};
use crate::checkout::coupon::{CouponOffer, CouponVerdict};
use crate::checkout::models::{CheckoutRequest, Order};
use crate::error::{CartError, CartResult};

pub const DEFAULT_SIZE: &str = "M";
pub const DEFAULT_COLOR: &str = "Black";

pub type SharedCart = Arc<CartStore>;

pub struct CartStore {
    authority: Arc<dyn PricingAuthority>,
    notifier: Arc<dyn Notifier>,
    snapshot: watch::Sender<CartSnapshot>,
    /// Held for the whole request/replace cycle of a mutation.
    queue: Mutex<()>,
    timeout: Duration,
}

impl CartStore {
    pub fn new(
        authority: Arc<dyn PricingAuthority>,
        notifier: Arc<dyn Notifier>,
        timeout: Duration,
    ) -> Self {
        let (snapshot, _) = watch::channel(CartSnapshot::default());
        Self {
            authority,
            notifier,
            snapshot,
            queue: Mutex::new(()),
            timeout,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current snapshot. Cheap clone of the held value.
    pub fn snapshot(&self) -> CartSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes after every replacement of the snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.snapshot.subscribe()
    }

    /// Guard consulted before checkout may open.
    pub fn is_empty(&self) -> bool {
        self.snapshot.borrow().is_empty()
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.snapshot.borrow().contains(product_id)
    }

    pub fn item_count(&self) -> u32 {
        self.snapshot.borrow().item_count
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Fetches the authoritative cart and replaces the local snapshot.
    #[instrument(skip(self))]
    pub async fn load(&self) -> CartResult<CartSnapshot> {
        let result = self.resync().await;
        if result.is_err() {
            self.notifier.notify(Notice::error("Failed to load cart"));
        }
        result
    }

    /// [`Self::load`] without user-facing notices.
    pub(crate) async fn resync(&self) -> CartResult<CartSnapshot> {
        let _turn = self.queue.lock().await;
        self.fetch_locked().await
    }

    async fn fetch_locked(&self) -> CartResult<CartSnapshot> {
        let snapshot = self
            .call(self.authority.get_cart())
            .await
            .map_err(CartError::fetch)?;
        if !snapshot.totals_consistent() {
            warn!(
                version = snapshot.version,
                "Authority returned inconsistent totals"
            );
            return Err(CartError::FetchFailed(inconsistent(&snapshot)));
        }
        self.snapshot.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Adds `quantity` units of `product`. The authority merges repeated adds
    /// of the same product into one line.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add(
        &self,
        product: &ProductSummary,
        quantity: u32,
        size: &str,
        color: &str,
    ) -> CartResult<CartSnapshot> {
        if quantity == 0 {
            let reason = "Quantity must be at least 1".to_string();
            return Err(CartError::ValidationFailed(reason));
        }
        let request = AddItemRequest {
            product_id: product.id,
            quantity,
            size: size.to_string(),
            color: color.to_string(),
        };

        let _turn = self.queue.lock().await;
        let result = self.call(self.authority.add_item(request)).await;
        match self.settle(result) {
            Ok(snapshot) => {
                let added = format!("{} added to cart!", product.name);
                self.notifier.notify(Notice::success(added));
                Ok(snapshot)
            }
            Err(err) => {
                self.notifier.notify(Notice::error("Failed to add to cart"));
                Err(err)
            }
        }
    }

    /// One unit in the default size and color.
    pub async fn quick_add(&self, product: &ProductSummary) -> CartResult<CartSnapshot> {
        self.add(product, 1, DEFAULT_SIZE, DEFAULT_COLOR).await
    }

    /// Removes the whole line. Removing an absent product is not an error.
    #[instrument(skip(self))]
    pub async fn remove(&self, product_id: ProductId) -> CartResult<CartSnapshot> {
        let _turn = self.queue.lock().await;
        self.remove_locked(product_id).await
    }

    async fn remove_locked(&self, product_id: ProductId) -> CartResult<CartSnapshot> {
        let result = self.call(self.authority.remove_item(product_id)).await;
        match self.settle(result) {
            Ok(snapshot) => {
                self.notifier.notify(Notice::info("Item removed from cart"));
                Ok(snapshot)
            }
            Err(err) => {
                self.notifier.notify(Notice::error("Failed to remove item"));
                Err(err)
            }
        }
    }

    /// Changes a line's quantity by `delta`; reaching zero removes the line.
    ///
    /// The current quantity is read after this call has acquired the queue,
    /// so concurrent calls compose instead of overwriting each other.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        product_id: ProductId,
        delta: i32,
    ) -> CartResult<CartSnapshot> {
        let _turn = self.queue.lock().await;

        let held = self.snapshot();
        let Some(item) = held.item(product_id).cloned() else {
            debug!("Product not in cart; nothing to update");
            return Ok(held);
        };
        let new_quantity = i64::from(item.quantity) + i64::from(delta);
        if new_quantity <= 0 {
            return self.remove_locked(product_id).await;
        }
        let quantity = u32::try_from(new_quantity).map_err(|_| {
            CartError::ValidationFailed(format!("Quantity out of range: {}", new_quantity))
        })?;

        let request = UpdateItemRequest {
            quantity,
            size: item.size,
            color: item.color,
            base_version: Some(held.version),
        };
        let result = self
            .call(self.authority.update_item(product_id, request))
            .await;

        if let Err(AuthorityError::Conflict { detail }) = &result {
            warn!(%detail, "Cart changed concurrently; reloading");
            if let Err(err) = self.fetch_locked().await {
                warn!(error = %err, "Reload after conflict failed");
            }
        }
        self.settle(result).inspect_err(|_| {
            self.notifier
                .notify(Notice::error("Failed to update quantity"));
        })
    }

    /// Resets the local snapshot to an empty cart without contacting the
    /// authority. Used once checkout has drained the cart server-side.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> CartSnapshot {
        let _turn = self.queue.lock().await;
        self.clear_locked()
    }

    fn clear_locked(&self) -> CartSnapshot {
        let version = self.snapshot.borrow().version;
        let empty = CartSnapshot::empty(version);
        self.snapshot.send_replace(empty.clone());
        empty
    }

    /// Empties the cart on the authority.
    #[instrument(skip(self))]
    pub async fn empty_cart(&self) -> CartResult<CartSnapshot> {
        let _turn = self.queue.lock().await;
        let result = self.call(self.authority.clear_cart()).await;
        self.settle(result).inspect_err(|_| {
            self.notifier.notify(Notice::error("Failed to clear cart"));
        })
    }

    /// Submits the order and, once accepted, clears the local snapshot, all
    /// under one turn of the queue. Mutations queued behind the order land on
    /// the drained cart and are kept.
    pub(crate) async fn place_order(&self, request: CheckoutRequest) -> AuthorityResult<Order> {
        let _turn = self.queue.lock().await;
        let order = self.call(self.authority.checkout(request)).await?;
        self.clear_locked();
        Ok(order)
    }

    /// Read-only coupon lookup; does not wait for queued mutations.
    pub(crate) async fn validate_coupon(&self, code: &str) -> AuthorityResult<CouponVerdict> {
        self.call(self.authority.validate_coupon(code)).await
    }

    pub(crate) async fn list_coupons(&self) -> AuthorityResult<Vec<CouponOffer>> {
        self.call(self.authority.list_coupons()).await
    }

    pub(crate) fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn call<T>(
        &self,
        request: impl Future<Output = AuthorityResult<T>>,
    ) -> AuthorityResult<T> {
        with_deadline(self.timeout, request).await
    }

    /// Turns a mutation response into the held snapshot.
    ///
    /// Responses with broken totals are refused. Responses older than the held
    /// snapshot are dropped and the held snapshot is returned instead.
    fn settle(&self, result: AuthorityResult<CartSnapshot>) -> CartResult<CartSnapshot> {
        let incoming = result.map_err(CartError::mutation)?;
        if !incoming.totals_consistent() {
            warn!(
                version = incoming.version,
                "Authority returned inconsistent totals"
            );
            return Err(CartError::MutationFailed(inconsistent(&incoming)));
        }

        let mut accepted = None;
        self.snapshot.send_if_modified(|held| {
            if incoming.version < held.version {
                debug!(
                    incoming = incoming.version,
                    held = held.version,
                    "Discarding stale snapshot"
                );
                accepted = Some(held.clone());
                false
            } else {
                *held = incoming.clone();
                accepted = Some(incoming);
                true
            }
        });
        let unapplied = || CartError::MutationFailed("snapshot was not applied".into());
        accepted.ok_or_else(unapplied)
    }
}

fn inconsistent(snapshot: &CartSnapshot) -> String {
    format!(
        "inconsistent totals: {} - {} + {} != {}",
        snapshot.subtotal, snapshot.discount, snapshot.delivery_charge, snapshot.total
    )
}
