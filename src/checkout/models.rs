//! Checkout Domain Models
//!
//! Delivery address, payment method and the order record returned by the
//! authority once checkout succeeds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::cart::models::CartItem;

// =============================================================================
// Delivery Address
// =============================================================================

/// Delivery address draft as typed by the user.
///
/// `address_line2` and `landmark` are optional; every other field is required
/// and must be non-empty after trimming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub full_name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default)]
    pub landmark: String,
}

impl DeliveryAddress {
    /// Names of required fields that are blank after trimming.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("full_name", &self.full_name),
            ("phone", &self.phone),
            ("address_line1", &self.address_line1),
            ("city", &self.city),
            ("state", &self.state),
            ("pincode", &self.pincode),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Copy of the address with every field trimmed.
    pub fn trimmed(&self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address_line1: self.address_line1.trim().to_string(),
            address_line2: self.address_line2.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            pincode: self.pincode.trim().to_string(),
            landmark: self.landmark.trim().to_string(),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[default]
    #[serde(rename = "COD")]
    Cod,
    Card,
    #[serde(rename = "UPI")]
    Upi,
    NetBanking,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [Self::Cod, Self::Card, Self::Upi, Self::NetBanking];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cod => "COD",
            Self::Card => "Card",
            Self::Upi => "UPI",
            Self::NetBanking => "NetBanking",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPaymentMethod(pub String);

impl fmt::Display for UnknownPaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown payment method: {:?}", self.0)
    }
}

impl std::error::Error for UnknownPaymentMethod {}

impl FromStr for PaymentMethod {
    type Err = UnknownPaymentMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == value)
            .ok_or_else(|| UnknownPaymentMethod(value.to_string()))
    }
}

// =============================================================================
// Checkout Request / Order
// =============================================================================

/// Body of the `Checkout` RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub delivery_address: DeliveryAddress,
    pub payment_method: String,
    /// Raw code as entered; the authority re-validates it.
    #[serde(default)]
    pub coupon_code: String,
}

/// Order created by a successful checkout. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub delivery_charge: Decimal,
    /// Final charged amount, as computed by the authority.
    pub total: Decimal,
    pub delivery_address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    pub estimated_delivery: String,
    #[serde(default = "Utc::now")]
    pub placed_at: DateTime<Utc>,
}
