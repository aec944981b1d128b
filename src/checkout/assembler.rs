//! Checkout Assembler
//!
//! One [`CheckoutAssembler`] drives a single checkout session over an explicit
//! [`CheckoutState`]:
//!
//! ```text
//! Collecting -> Validating -> Submitting -> Completed
//!      ^            |             |
//!      +------------+             v
//!      +--------------------- Failed
//! ```
//!
//! The session owns the address draft, the payment method and the applied
//! coupon; all of them are dropped with the session.

use std::fmt;
use tracing::{debug, info, instrument, warn};

use super::coupon::{
    AppliedCoupon, CouponCode, CouponMessages, CouponOffer, CouponPreview, MessageKind,
};
use super::models::{CheckoutRequest, DeliveryAddress, Order, PaymentMethod};
use crate::authority::AuthorityError;
use crate::cart::notify::Notice;
use crate::cart::store::SharedCart;
use crate::error::{CartError, CartResult};

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    Collecting,
    Validating,
    Submitting,
    Completed,
    Failed,
}

impl CheckoutState {
    pub fn can_transition_to(self, next: CheckoutState) -> bool {
        use CheckoutState::*;
        matches!(
            (self, next),
            (Collecting, Validating)
                | (Validating, Collecting)
                | (Validating, Submitting)
                | (Submitting, Completed)
                | (Submitting, Failed)
                | (Failed, Collecting)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "Collecting",
            Self::Validating => "Validating",
            Self::Submitting => "Submitting",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Assembler
// =============================================================================

pub struct CheckoutAssembler {
    cart: SharedCart,
    messages: CouponMessages,
    state: CheckoutState,
    /// Every state entered, starting with `Collecting`.
    history: Vec<CheckoutState>,
    address: DeliveryAddress,
    payment_method: String,
    /// Accepted coupon; its code is the one sent at submit time.
    applied: Option<AppliedCoupon>,
    order: Option<Order>,
}

impl CheckoutAssembler {
    /// Opens a session. Refused while the cart is empty.
    pub fn open(cart: SharedCart, messages: CouponMessages) -> CartResult<Self> {
        if cart.is_empty() {
            cart.notify(Notice::error("Your cart is empty"));
            return Err(CartError::CartEmpty);
        }
        Ok(Self {
            cart,
            messages,
            state: CheckoutState::Collecting,
            history: vec![CheckoutState::Collecting],
            address: DeliveryAddress::default(),
            payment_method: PaymentMethod::default().to_string(),
            applied: None,
            order: None,
        })
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    pub fn history(&self) -> &[CheckoutState] {
        &self.history
    }

    pub fn address(&self) -> &DeliveryAddress {
        &self.address
    }

    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    pub fn applied_coupon(&self) -> Option<&AppliedCoupon> {
        self.applied.as_ref()
    }

    pub fn coupon_messages(&self) -> &CouponMessages {
        &self.messages
    }

    /// The order, once the session has completed.
    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    // =========================================================================
    // Collecting
    // =========================================================================

    pub fn set_address(&mut self, address: DeliveryAddress) -> CartResult<()> {
        *self.address_mut()? = address;
        Ok(())
    }

    /// Mutable access to the draft for field-by-field editing.
    pub fn address_mut(&mut self) -> CartResult<&mut DeliveryAddress> {
        self.ensure_collecting("edit address")?;
        Ok(&mut self.address)
    }

    /// Accepted as typed; checked against the known methods on submit.
    pub fn select_payment_method(&mut self, method: impl Into<String>) -> CartResult<()> {
        self.ensure_collecting("select payment method")?;
        self.payment_method = method.into();
        Ok(())
    }

    pub async fn available_coupons(&self) -> CartResult<Vec<CouponOffer>> {
        self.cart.list_coupons().await.map_err(CartError::fetch)
    }

    /// Validates `code` with the authority and, when accepted, replaces the
    /// applied coupon. A rejected code leaves the previous coupon in place,
    /// and that coupon is still the one submitted.
    #[instrument(skip(self))]
    pub async fn apply_coupon(&mut self, code: &str) -> CartResult<AppliedCoupon> {
        self.ensure_collecting("apply coupon")?;
        let code = match CouponCode::parse(code) {
            Ok(code) => code,
            Err(err) => {
                self.messages.post(MessageKind::Error, "Enter coupon code");
                return Err(err);
            }
        };

        let verdict = match self.cart.validate_coupon(code.as_str()).await {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(error = %err, "Coupon validation failed");
                self.messages
                    .post(MessageKind::Error, "Failed to apply coupon");
                return Err(CartError::fetch(err));
            }
        };

        if !verdict.valid {
            debug!(message = %verdict.message, "Coupon rejected");
            self.messages.post(MessageKind::Error, &verdict.message);
            return Err(CartError::CouponRejected(verdict.message));
        }

        // The authority's canonical spelling wins unless it sent none.
        let code = verdict
            .code
            .as_deref()
            .and_then(|c| CouponCode::parse(c).ok())
            .unwrap_or(code);
        let applied = AppliedCoupon {
            code,
            valid: true,
            discount_percent: verdict.discount_percent,
            message: verdict.message,
        };
        self.messages.post(MessageKind::Success, &applied.message);
        self.applied = Some(applied.clone());
        Ok(applied)
    }

    /// Display-only effect of the applied coupon on the current snapshot.
    /// Never the amount charged.
    pub fn preview(&self) -> Option<CouponPreview> {
        let applied = self.applied.as_ref()?;
        let snapshot = self.cart.snapshot();
        Some(CouponPreview::compute(&snapshot, applied.discount_percent))
    }

    // =========================================================================
    // Submit
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn submit(&mut self) -> CartResult<Order> {
        self.ensure_collecting("submit")?;
        if self.cart.is_empty() {
            self.cart.notify(Notice::error("Your cart is empty"));
            return Err(CartError::CartEmpty);
        }

        self.transition(CheckoutState::Validating)?;
        let payment_method = match self.validate() {
            Ok(method) => method,
            Err(err) => {
                self.cart.notify(Notice::error("Fill all required fields"));
                self.transition(CheckoutState::Collecting)?;
                return Err(err);
            }
        };

        self.transition(CheckoutState::Submitting)?;
        let request = CheckoutRequest {
            delivery_address: self.address.trimmed(),
            payment_method: payment_method.as_str().to_string(),
            coupon_code: self
                .applied
                .as_ref()
                .map(|c| c.code.as_str().to_string())
                .unwrap_or_default(),
        };

        match self.cart.place_order(request).await {
            Ok(order) => {
                self.transition(CheckoutState::Completed)?;
                if let Err(err) = self.cart.resync().await {
                    warn!(error = %err, "Could not refresh cart after checkout");
                }
                info!(order_id = %order.order_id, total = %order.total, "Checkout completed");
                let placed = format!("Order placed! Order ID: {}", order.order_id);
                self.cart.notify(Notice::success(placed));

                self.address = DeliveryAddress::default();
                self.applied = None;
                self.order = Some(order.clone());
                Ok(order)
            }
            Err(err) => {
                warn!(error = %err, "Checkout failed");
                self.transition(CheckoutState::Failed)?;
                self.cart.notify(Notice::error("Checkout failed"));
                self.transition(CheckoutState::Collecting)?;
                Err(CartError::CheckoutFailed(failure_detail(err)))
            }
        }
    }

    /// Abandons the session, discarding the draft and any applied coupon.
    pub fn dismiss(self) {
        debug!(state = %self.state, "Checkout dismissed");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn validate(&self) -> CartResult<PaymentMethod> {
        let missing = self.address.missing_fields();
        if !missing.is_empty() {
            return Err(CartError::ValidationFailed(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        let method = self.payment_method.parse::<PaymentMethod>();
        method.map_err(|err| CartError::ValidationFailed(err.to_string()))
    }

    fn ensure_collecting(&self, action: &str) -> CartResult<()> {
        if self.state == CheckoutState::Collecting {
            return Ok(());
        }
        Err(CartError::InvalidTransition {
            from: self.state.to_string(),
            to: action.to_string(),
        })
    }

    fn transition(&mut self, next: CheckoutState) -> CartResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(CartError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.state, to = %next, "Checkout transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

fn failure_detail(err: AuthorityError) -> String {
    match err {
        AuthorityError::Rejected { detail, .. } | AuthorityError::Conflict { detail } => detail,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::testing::{fixture_catalog, Rpc, ScriptedAuthority};
    use crate::cart::models::ProductId;
    use crate::cart::notify::NoticeLevel;
    use crate::cart::store::CartStore;
    use crate::checkout::coupon::{CouponMessage, CouponVerdict};
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        cart: SharedCart,
        authority: Arc<ScriptedAuthority>,
        notices: mpsc::UnboundedReceiver<Notice>,
    }

    impl Harness {
        async fn with_shirt() -> Self {
            let h = Self::empty();
            let shirt = fixture_catalog().get(ProductId(1)).unwrap().summary();
            h.cart.add(&shirt, 1, "M", "Black").await.unwrap();
            h
        }

        fn empty() -> Self {
            let authority = ScriptedAuthority::with_fixtures();
            let (tx, notices) = mpsc::unbounded_channel();
            let timeout = Duration::from_secs(10);
            let cart = CartStore::new(authority.clone(), Arc::new(tx), timeout);
            Self {
                cart: Arc::new(cart),
                authority,
                notices,
            }
        }

        fn open(&self) -> CheckoutAssembler {
            let messages = CouponMessages::new(Duration::from_secs(3));
            CheckoutAssembler::open(self.cart.clone(), messages).unwrap()
        }

        fn notices(&mut self) -> Vec<Notice> {
            let mut all = Vec::new();
            while let Ok(notice) = self.notices.try_recv() {
                all.push(notice);
            }
            all
        }
    }

    fn message(checkout: &CheckoutAssembler) -> CouponMessage {
        checkout.coupon_messages().current().unwrap()
    }

    fn address() -> DeliveryAddress {
        DeliveryAddress {
            full_name: " Asha Rao ".into(),
            phone: "9876543210".into(),
            address_line1: "12 Lake Road".into(),
            city: "Pune".into(),
            state: "MH".into(),
            pincode: "411001".into(),
            ..DeliveryAddress::default()
        }
    }

    #[test]
    fn test_transition_table() {
        use CheckoutState::*;
        assert!(Collecting.can_transition_to(Validating));
        assert!(Failed.can_transition_to(Collecting));
        assert!(!Collecting.can_transition_to(Submitting));
        assert!(!Completed.can_transition_to(Collecting));
        assert!(!Validating.can_transition_to(Completed));
    }

    #[tokio::test]
    async fn test_open_refused_on_empty_cart() {
        let mut h = Harness::empty();
        let messages = CouponMessages::new(Duration::from_secs(3));
        let result = CheckoutAssembler::open(h.cart.clone(), messages);
        assert!(matches!(result, Err(CartError::CartEmpty)));
        assert_eq!(h.notices(), vec![Notice::error("Your cart is empty")]);
    }

    #[tokio::test]
    async fn test_submit_refused_when_cart_emptied_meanwhile() {
        let h = Harness::with_shirt().await;
        let mut checkout = h.open();
        checkout.set_address(address()).unwrap();
        h.cart.remove(ProductId(1)).await.unwrap();

        assert_eq!(checkout.submit().await, Err(CartError::CartEmpty));
        assert_eq!(checkout.history(), &[CheckoutState::Collecting]);
        assert_eq!(h.authority.count(Rpc::Checkout), 0);
    }

    #[tokio::test]
    async fn test_missing_address_field_never_reaches_authority() {
        let mut h = Harness::with_shirt().await;
        let mut checkout = h.open();
        checkout.set_address(address()).unwrap();
        checkout.address_mut().unwrap().city = "  ".into();

        let err = checkout.submit().await.unwrap_err();
        assert!(matches!(err, CartError::ValidationFailed(ref m) if m.contains("city")));
        assert_eq!(checkout.state(), CheckoutState::Collecting);
        assert_eq!(h.authority.count(Rpc::Checkout), 0);
        let unfilled = Notice::error("Fill all required fields");
        assert!(h.notices().contains(&unfilled));
        assert_eq!(checkout.address().city, "  ");
    }

    #[tokio::test]
    async fn test_unknown_payment_method_is_validation_failure() {
        let h = Harness::with_shirt().await;
        let mut checkout = h.open();
        checkout.set_address(address()).unwrap();
        checkout.select_payment_method("Barter").unwrap();

        let err = checkout.submit().await.unwrap_err();
        assert!(matches!(err, CartError::ValidationFailed(_)));
        assert_eq!(h.authority.count(Rpc::Checkout), 0);
        assert_eq!(checkout.payment_method(), "Barter");
    }

    #[tokio::test]
    async fn test_empty_coupon_input_is_local_failure() {
        let h = Harness::with_shirt().await;
        let mut checkout = h.open();

        let err = checkout.apply_coupon("   ").await.unwrap_err();
        assert!(matches!(err, CartError::ValidationFailed(_)));
        assert_eq!(h.authority.count(Rpc::ValidateCoupon), 0);
        assert_eq!(message(&checkout).text, "Enter coupon code");
    }

    #[tokio::test]
    async fn test_valid_coupon_produces_preview_only() {
        let h = Harness::with_shirt().await;
        let mut checkout = h.open();
        let before = h.cart.snapshot();

        let applied = checkout.apply_coupon("style10").await.unwrap();
        assert_eq!(applied.code.as_str(), "STYLE10");
        assert_eq!(applied.discount_percent, 10);

        // 1299 subtotal, 129.90 promo, free delivery -> 1169.10; coupon 129.90
        let preview = checkout.preview().unwrap();
        assert_eq!(preview.coupon_discount, Decimal::new(12990, 2));
        assert_eq!(preview.provisional_total, Decimal::new(103920, 2));
        assert_eq!(h.cart.snapshot(), before);
        assert_eq!(message(&checkout).kind, MessageKind::Success);
    }

    #[tokio::test]
    async fn test_rejected_coupon_keeps_previous_coupon() {
        let h = Harness::with_shirt().await;
        let mut checkout = h.open();
        checkout.apply_coupon("STYLE20").await.unwrap();

        let err = checkout.apply_coupon("EXPIRED50").await.unwrap_err();
        assert_eq!(err, CartError::CouponRejected("Invalid coupon code".into()));
        assert_eq!(checkout.applied_coupon().unwrap().code.as_str(), "STYLE20");
        assert_eq!(message(&checkout).text, "Invalid coupon code");
    }

    #[tokio::test]
    async fn test_accepted_coupon_without_code_keeps_entered_code() {
        let h = Harness::with_shirt().await;
        let mut checkout = h.open();
        h.authority.verdict_once(CouponVerdict {
            valid: true,
            code: Some(String::new()),
            discount_percent: 15,
            message: "Coupon applied! 15% discount".into(),
        });

        let applied = checkout.apply_coupon(" newuser ").await.unwrap();
        assert_eq!(applied.code.as_str(), "NEWUSER");
        assert_eq!(checkout.applied_coupon(), Some(&applied));
        assert_eq!(message(&checkout).kind, MessageKind::Success);
    }

    #[tokio::test]
    async fn test_coupon_lookup_failure_is_fetch_failure() {
        let h = Harness::with_shirt().await;
        let mut checkout = h.open();
        let offline = AuthorityError::Transport("offline".into());
        h.authority.fail(Rpc::ValidateCoupon, offline);

        let err = checkout.apply_coupon("STYLE10").await.unwrap_err();
        assert!(matches!(err, CartError::FetchFailed(_)));
        assert!(checkout.applied_coupon().is_none());
        assert_eq!(message(&checkout).text, "Failed to apply coupon");
    }

    #[tokio::test]
    async fn test_successful_checkout_clears_cart_and_trusts_authority_total() {
        let mut h = Harness::with_shirt().await;
        let mut checkout = h.open();
        checkout.set_address(address()).unwrap();
        checkout.select_payment_method("UPI").unwrap();
        checkout.apply_coupon("STYLE20").await.unwrap();
        // A rejected follow-up code leaves STYLE20 as the coupon that is sent.
        checkout.apply_coupon("STYLE2O").await.unwrap_err();
        let preview = checkout.preview().unwrap();

        let order = checkout.submit().await.unwrap();
        // 1299 - 129.90 promo - 259.80 coupon, free delivery
        assert_eq!(order.total, Decimal::new(90930, 2));
        assert_eq!(order.total, preview.provisional_total);
        assert_eq!(order.discount, Decimal::new(38970, 2));
        assert_eq!(order.payment_method, PaymentMethod::Upi);
        assert_eq!(order.delivery_address.full_name, "Asha Rao");

        let cart = h.cart.snapshot();
        assert_eq!(cart.item_count, 0);
        assert_eq!(cart.total, Decimal::ZERO);
        assert_eq!(h.authority.count(Rpc::GetCart), 1);

        assert_eq!(checkout.state(), CheckoutState::Completed);
        assert_eq!(
            checkout.history(),
            &[
                CheckoutState::Collecting,
                CheckoutState::Validating,
                CheckoutState::Submitting,
                CheckoutState::Completed
            ]
        );
        assert!(checkout.applied_coupon().is_none());
        assert_eq!(checkout.order().unwrap().order_id, order.order_id);

        let last = h.notices().pop().unwrap();
        assert_eq!(last.level, NoticeLevel::Success);
        assert!(last.message.starts_with("Order placed! Order ID: ORD"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_queued_behind_order_survives_checkout() {
        let h = Harness::with_shirt().await;
        let mut checkout = h.open();
        checkout.set_address(address()).unwrap();
        h.authority.delay(Rpc::Checkout, Duration::from_millis(200));
        let offline = AuthorityError::Transport("offline".into());
        h.authority.fail(Rpc::GetCart, offline);

        let tote = fixture_catalog().get(ProductId(2)).unwrap().summary();
        let (order, added) = tokio::join!(checkout.submit(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.cart.add(&tote, 1, "M", "Natural").await
        });
        order.unwrap();
        added.unwrap();

        assert_eq!(checkout.state(), CheckoutState::Completed);
        let cart = h.cart.snapshot();
        assert!(cart.contains(ProductId(2)));
        assert!(!cart.contains(ProductId(1)));
        assert_eq!(cart.item_count, 1);
    }

    #[tokio::test]
    async fn test_authority_failure_returns_to_collecting_with_input_kept() {
        let mut h = Harness::with_shirt().await;
        let mut checkout = h.open();
        checkout.set_address(address()).unwrap();
        checkout.apply_coupon("NEWUSER").await.unwrap();
        let maintenance = AuthorityError::Rejected {
            status: 503,
            detail: "maintenance".into(),
        };
        h.authority.fail(Rpc::Checkout, maintenance);

        let err = checkout.submit().await.unwrap_err();
        assert_eq!(err, CartError::CheckoutFailed("maintenance".into()));
        assert_eq!(checkout.state(), CheckoutState::Collecting);
        assert!(checkout.history().contains(&CheckoutState::Failed));
        assert_eq!(checkout.address(), &address());
        assert_eq!(checkout.applied_coupon().unwrap().discount_percent, 15);
        assert_eq!(h.cart.item_count(), 1);
        assert!(h.notices().contains(&Notice::error("Checkout failed")));

        h.authority.recover(Rpc::Checkout);
        let order = checkout.submit().await.unwrap();
        assert!(order.order_id.starts_with("ORD"));
    }

    #[tokio::test]
    async fn test_completed_session_refuses_further_changes() {
        let h = Harness::with_shirt().await;
        let mut checkout = h.open();
        checkout.set_address(address()).unwrap();
        checkout.submit().await.unwrap();

        let refused = |err: CartError| matches!(err, CartError::InvalidTransition { .. });
        assert!(refused(checkout.submit().await.unwrap_err()));
        assert!(refused(checkout.apply_coupon("STYLE10").await.unwrap_err()));
        assert!(refused(checkout.address_mut().unwrap_err()));
        checkout.dismiss();
    }

    #[tokio::test]
    async fn test_available_coupons() {
        let h = Harness::with_shirt().await;
        let checkout = h.open();
        let coupons = checkout.available_coupons().await.unwrap();
        let fashion = coupons.iter().find(|c| c.code == "FASHION25").unwrap();
        assert_eq!(fashion.discount_percent, 25);
    }
}
