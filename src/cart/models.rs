//! Shopping Cart Domain Models
//!
//! This module contains the data structures the cart engine exchanges with the
//! pricing authority. All monetary fields are authority-computed; the client
//! only ever reads them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::helpers::round_money;

// =============================================================================
// Product Reference
// =============================================================================

/// Opaque product identifier assigned by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub u64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProductId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Display fields of a product as carried inside a cart line.
///
/// Treated as immutable by the client. Extra catalog fields sent by the
/// authority are ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: String,
    /// Promotional discount percentage applied by the authority.
    #[serde(default)]
    pub discount: u32,
}

// =============================================================================
// Cart Snapshot
// =============================================================================

/// One line of the cart, keyed by product id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: ProductSummary,
    pub quantity: u32,
    pub size: String,
    pub color: String,
    #[serde(default)]
    pub item_subtotal: Decimal,
    #[serde(default)]
    pub item_discount: Decimal,
    #[serde(default)]
    pub item_total: Decimal,
}

/// Complete view of the cart at one point in time.
///
/// Snapshots are replaced wholesale, never patched field by field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CartSnapshot {
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub delivery_charge: Decimal,
    #[serde(default)]
    pub total: Decimal,
    #[serde(default)]
    pub item_count: u32,
    /// Authority-assigned sequence number, bumped on every effective mutation.
    #[serde(default)]
    pub version: u64,
}

impl CartSnapshot {
    /// An empty cart carrying the given version.
    pub fn empty(version: u64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product.id == product_id)
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.item(product_id).is_some()
    }

    /// Checks `total == subtotal - discount + delivery_charge` to the cent.
    /// Amounts cross the wire as JSON floats, so sub-cent noise is ignored.
    pub fn totals_consistent(&self) -> bool {
        round_money(self.total) == round_money(self.subtotal - self.discount + self.delivery_charge)
    }
}
