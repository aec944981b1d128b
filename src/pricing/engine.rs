//! Cart pricing and order assembly.

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Catalog, PricingError};
use crate::authority::{AddItemRequest, UpdateItemRequest};
use crate::cart::helpers::{format_item_summary, percent_of, round_money};
use crate::cart::models::{CartItem, CartSnapshot, ProductId};
use crate::checkout::coupon::{CouponOffer, CouponVerdict};
use crate::checkout::models::{CheckoutRequest, Order, PaymentMethod};

/// Coupon table served by the authority.
const COUPONS: [(&str, u32); 4] = [
    ("STYLE10", 10),
    ("STYLE20", 20),
    ("NEWUSER", 15),
    ("FASHION25", 25),
];

const ESTIMATED_DELIVERY: &str = "5-7 business days";

pub type SharedEngine = Arc<PricingEngine>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingRules {
    /// Subtotal at or above which delivery is free.
    pub free_delivery_threshold: Decimal,
    pub delivery_charge: Decimal,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            free_delivery_threshold: Decimal::new(999, 0),
            delivery_charge: Decimal::new(99, 0),
        }
    }
}

#[derive(Debug, Clone)]
struct Line {
    product_id: ProductId,
    quantity: u32,
    size: String,
    color: String,
}

#[derive(Debug, Default)]
struct CartLines {
    version: u64,
    lines: Vec<Line>,
}

impl CartLines {
    fn line_mut(&mut self, product_id: ProductId) -> Option<&mut Line> {
        self.lines.iter_mut().find(|l| l.product_id == product_id)
    }

    /// Units in the cart if `product_id`'s line held `quantity`, or `None`
    /// when that does not fit in a `u32`.
    fn units_with(&self, product_id: ProductId, quantity: u32) -> Option<u32> {
        self.lines
            .iter()
            .filter(|l| l.product_id != product_id)
            .try_fold(quantity, |sum, l| sum.checked_add(l.quantity))
    }
}

pub struct PricingEngine {
    catalog: Catalog,
    rules: PricingRules,
    /// Carts keyed by cart id. DashMap shards the locking per cart.
    carts: DashMap<String, CartLines>,
}

impl PricingEngine {
    pub fn new(catalog: Catalog, rules: PricingRules) -> Self {
        info!(products = catalog.len(), "Pricing engine ready");
        Self {
            catalog,
            rules,
            carts: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // =========================================================================
    // Cart RPCs
    // =========================================================================

    pub fn snapshot(&self, cart_id: &str) -> CartSnapshot {
        match self.carts.get(cart_id) {
            Some(cart) => self.price(&cart),
            None => CartSnapshot::empty(0),
        }
    }

    pub fn add(
        &self,
        cart_id: &str,
        request: AddItemRequest,
    ) -> Result<CartSnapshot, PricingError> {
        let product = self
            .catalog
            .get(request.product_id)
            .ok_or(PricingError::ProductNotFound(request.product_id))?;
        if !product.in_stock {
            return Err(PricingError::OutOfStock(request.product_id));
        }
        if request.quantity == 0 {
            return Err(PricingError::InvalidQuantity);
        }
        if !product.offers_size(&request.size) {
            return Err(PricingError::InvalidOption {
                field: "size",
                value: request.size,
            });
        }
        if !product.offers_color(&request.color) {
            return Err(PricingError::InvalidOption {
                field: "color",
                value: request.color,
            });
        }

        let mut cart = self.carts.entry(cart_id.to_string()).or_default();
        let product_id = request.product_id;
        let index = cart.lines.iter().position(|l| l.product_id == product_id);
        let merged = match index {
            Some(index) => cart.lines[index].quantity.checked_add(request.quantity),
            None => Some(request.quantity),
        };
        let quantity = merged
            .filter(|&q| cart.units_with(product_id, q).is_some())
            .ok_or(PricingError::QuantityTooLarge)?;

        match index {
            // Merged lines keep the options of the first add.
            Some(index) => cart.lines[index].quantity = quantity,
            None => cart.lines.push(Line {
                product_id,
                quantity,
                size: request.size,
                color: request.color,
            }),
        }
        cart.version += 1;
        debug!(cart_id, %product_id, version = cart.version, "Item added");
        Ok(self.price(&cart))
    }

    /// Removing an absent product returns the unchanged snapshot.
    pub fn remove(&self, cart_id: &str, product_id: ProductId) -> CartSnapshot {
        let Some(mut cart) = self.carts.get_mut(cart_id) else {
            return CartSnapshot::empty(0);
        };
        let before = cart.lines.len();
        cart.lines.retain(|l| l.product_id != product_id);
        if cart.lines.len() != before {
            cart.version += 1;
            debug!(cart_id, %product_id, version = cart.version, "Item removed");
        }
        self.price(&cart)
    }

    pub fn update(
        &self,
        cart_id: &str,
        product_id: ProductId,
        request: UpdateItemRequest,
    ) -> Result<CartSnapshot, PricingError> {
        let mut cart = self
            .carts
            .get_mut(cart_id)
            .ok_or(PricingError::NotInCart(product_id))?;
        if let Some(expected) = request.base_version {
            if expected != cart.version {
                return Err(PricingError::VersionConflict {
                    expected,
                    current: cart.version,
                });
            }
        }
        if request.quantity == 0 {
            return Err(PricingError::InvalidQuantity);
        }
        let fits = cart.units_with(product_id, request.quantity).is_some();

        let line = cart
            .line_mut(product_id)
            .ok_or(PricingError::NotInCart(product_id))?;
        // Size and color are fixed for a line; changing them is remove + add.
        if line.size != request.size {
            return Err(PricingError::InvalidOption {
                field: "size",
                value: request.size,
            });
        }
        if line.color != request.color {
            return Err(PricingError::InvalidOption {
                field: "color",
                value: request.color,
            });
        }
        if !fits {
            return Err(PricingError::QuantityTooLarge);
        }
        line.quantity = request.quantity;
        cart.version += 1;
        debug!(
            cart_id,
            %product_id,
            quantity = request.quantity,
            version = cart.version,
            "Item updated"
        );
        Ok(self.price(&cart))
    }

    pub fn clear(&self, cart_id: &str) -> CartSnapshot {
        let mut cart = self.carts.entry(cart_id.to_string()).or_default();
        if !cart.lines.is_empty() {
            cart.lines.clear();
            cart.version += 1;
        }
        CartSnapshot::empty(cart.version)
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    pub fn validate_coupon(&self, code: &str) -> CouponVerdict {
        let code = code.trim().to_uppercase();
        match coupon_percent(&code) {
            Some(percent) => CouponVerdict {
                valid: true,
                code: Some(code),
                discount_percent: percent,
                message: format!("Coupon applied! {}% discount", percent),
            },
            None => CouponVerdict {
                valid: false,
                code: None,
                discount_percent: 0,
                message: "Invalid coupon code".to_string(),
            },
        }
    }

    pub fn coupons(&self) -> Vec<CouponOffer> {
        COUPONS
            .iter()
            .map(|(code, percent)| CouponOffer {
                code: code.to_string(),
                discount_percent: *percent,
            })
            .collect()
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Prices the cart, applies the coupon, drains the cart and returns the order.
    pub fn checkout(&self, cart_id: &str, request: CheckoutRequest) -> Result<Order, PricingError> {
        let mut cart = self.carts.get_mut(cart_id).ok_or(PricingError::CartEmpty)?;
        if cart.lines.is_empty() {
            return Err(PricingError::CartEmpty);
        }

        let address = request.delivery_address.trimmed();
        let missing = address.missing_fields();
        if !missing.is_empty() {
            let missing = missing.into_iter().map(String::from).collect();
            return Err(PricingError::InvalidAddress(missing));
        }
        let payment_method: PaymentMethod = match request.payment_method.parse() {
            Ok(method) => method,
            Err(_) => return Err(PricingError::InvalidPaymentMethod(request.payment_method)),
        };

        let priced = self.price(&cart);
        let coupon_discount = coupon_percent(&request.coupon_code.trim().to_uppercase())
            .map(|percent| percent_of(priced.subtotal, percent))
            .unwrap_or(Decimal::ZERO);
        let total = (priced.total - coupon_discount).max(Decimal::ZERO);

        let order = Order {
            order_id: new_order_id(),
            items: priced.items,
            subtotal: priced.subtotal,
            discount: priced.discount + coupon_discount,
            delivery_charge: priced.delivery_charge,
            total,
            delivery_address: address,
            payment_method,
            estimated_delivery: ESTIMATED_DELIVERY.to_string(),
            placed_at: Utc::now(),
        };

        cart.lines.clear();
        cart.version += 1;
        info!(
            cart_id,
            order_id = %order.order_id,
            total = %order.total,
            items = %format_item_summary(&order.items),
            "Order placed"
        );
        Ok(order)
    }

    // =========================================================================
    // Pricing
    // =========================================================================

    fn price(&self, cart: &CartLines) -> CartSnapshot {
        let items: Vec<CartItem> = cart
            .lines
            .iter()
            .filter_map(|line| {
                let product = self.catalog.get(line.product_id)?;
                let item_subtotal = round_money(product.price * Decimal::from(line.quantity));
                let item_discount = percent_of(item_subtotal, product.discount);
                Some(CartItem {
                    product: product.summary(),
                    quantity: line.quantity,
                    size: line.size.clone(),
                    color: line.color.clone(),
                    item_subtotal,
                    item_discount,
                    item_total: item_subtotal - item_discount,
                })
            })
            .collect();

        let subtotal = round_money(items.iter().map(|i| i.item_subtotal).sum());
        let discount = round_money(items.iter().map(|i| i.item_discount).sum());
        let free_delivery = subtotal >= self.rules.free_delivery_threshold;
        let delivery_charge = if items.is_empty() || free_delivery {
            Decimal::ZERO
        } else {
            self.rules.delivery_charge
        };

        CartSnapshot {
            item_count: items.iter().map(|i| i.quantity).sum(),
            items,
            subtotal,
            discount,
            delivery_charge,
            total: subtotal - discount + delivery_charge,
            version: cart.version,
        }
    }
}

fn coupon_percent(code: &str) -> Option<u32> {
    COUPONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, percent)| *percent)
}

fn new_order_id() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("ORD{}", &id[..12])
}
