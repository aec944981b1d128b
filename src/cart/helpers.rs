//! Shopping Cart Business Logic Helpers
//!
//! Small pure functions shared by the client-side store and the authority.

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use super::models::CartItem;

/// Returns the provided `cart_id` or creates a new UUID string when `None`.
///
/// This guarantees that every cart operation works with a non-empty identifier.
pub fn get_or_create_cart_id(cart_id: Option<String>) -> String {
    cart_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

/// Rounds a monetary amount to two decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount * percent / 100`, rounded to money precision.
pub fn percent_of(amount: Decimal, percent: u32) -> Decimal {
    round_money(amount * Decimal::from(percent) / Decimal::ONE_HUNDRED)
}

/// Produces a human-readable one-line summary for a list of cart items.
///
/// Example output: `"2x Linen Shirt (M, Black), 1x Denim Jacket (L, Blue)"`.
pub fn format_item_summary(items: &[CartItem]) -> String {
    items
        .iter()
        .map(|i| {
            let name = &i.product.name;
            format!("{}x {} ({}, {})", i.quantity, name, i.size, i.color)
        })
        .collect::<Vec<_>>()
        .join(", ")
}
