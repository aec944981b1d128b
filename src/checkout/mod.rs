//! Checkout Module
//!
//! Coupon reconciliation and the checkout state machine:
//! - Checkout models (DeliveryAddress, PaymentMethod, Order)
//! - Coupon codes, previews and the transient coupon message board
//! - The CheckoutAssembler that turns a cart into an order

pub mod assembler;
pub mod coupon;
pub mod models;

pub use assembler::{CheckoutAssembler, CheckoutState};
pub use coupon::{AppliedCoupon, CouponCode, CouponMessages, CouponPreview};
pub use models::{CheckoutRequest, DeliveryAddress, Order, PaymentMethod};
