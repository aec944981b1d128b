//! Coupon reconciliation
//!
//! Coupons are validated by the authority; the client only derives a
//! display-only preview from the current snapshot. The preview is never merged
//! into the snapshot and never sent back as the amount to charge.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::watch;

use crate::cart::helpers::percent_of;
use crate::cart::models::CartSnapshot;
use crate::error::CartError;

// =============================================================================
// Coupon Code
// =============================================================================

/// Canonical (trimmed, upper-case) coupon code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouponCode(String);

impl CouponCode {
    pub fn parse(raw: &str) -> Result<Self, CartError> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() {
            return Err(CartError::ValidationFailed("Enter coupon code".into()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Authority Payloads
// =============================================================================

/// Answer of the `ValidateCoupon` RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponVerdict {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, alias = "discount")]
    pub discount_percent: u32,
    pub message: String,
}

/// Entry of the public coupon catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponOffer {
    pub code: String,
    pub discount_percent: u32,
}

// =============================================================================
// Applied Coupon / Preview
// =============================================================================

/// Coupon accepted for the current checkout session only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    pub code: CouponCode,
    pub valid: bool,
    pub discount_percent: u32,
    pub message: String,
}

/// Provisional figures shown while the user is still checking out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponPreview {
    pub coupon_discount: Decimal,
    pub provisional_total: Decimal,
}

impl CouponPreview {
    /// Mirrors the authority's formula: percentage of the subtotal, taken off
    /// the authoritative total, floored at zero.
    pub fn compute(snapshot: &CartSnapshot, discount_percent: u32) -> Self {
        let coupon_discount = percent_of(snapshot.subtotal, discount_percent);
        let provisional_total = (snapshot.total - coupon_discount).max(Decimal::ZERO);
        Self {
            coupon_discount,
            provisional_total,
        }
    }
}

// =============================================================================
// Transient Message Board
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponMessage {
    pub kind: MessageKind,
    pub text: String,
}

/// Value observed by [`CouponMessages::subscribe`] receivers.
#[derive(Debug, Default)]
pub struct MessageSlot {
    generation: u64,
    pub current: Option<CouponMessage>,
}

/// Coupon feedback line that clears itself after a fixed display window.
///
/// Each post schedules its own clear; a timer only clears the message it was
/// scheduled for, so a newer message stays up for its full window.
#[derive(Clone)]
pub struct CouponMessages {
    slot: Arc<watch::Sender<MessageSlot>>,
    ttl: Duration,
}

impl CouponMessages {
    pub fn new(ttl: Duration) -> Self {
        let (slot, _) = watch::channel(MessageSlot::default());
        Self {
            slot: Arc::new(slot),
            ttl,
        }
    }

    /// Shows `text` and schedules its removal. Must be called within a Tokio runtime.
    pub fn post(&self, kind: MessageKind, text: impl Into<String>) {
        let mut generation = 0;
        self.slot.send_modify(|slot| {
            slot.generation += 1;
            generation = slot.generation;
            slot.current = Some(CouponMessage {
                kind,
                text: text.into(),
            });
        });

        let slot = Arc::clone(&self.slot);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            slot.send_if_modified(|slot| {
                if slot.generation == generation && slot.current.is_some() {
                    slot.current = None;
                    true
                } else {
                    false
                }
            });
        });
    }

    pub fn current(&self) -> Option<CouponMessage> {
        self.slot.borrow().current.clone()
    }

    /// Receiver that wakes whenever a message appears or clears.
    pub fn subscribe(&self) -> watch::Receiver<MessageSlot> {
        self.slot.subscribe()
    }
}
