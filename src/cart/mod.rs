//! Shopping Cart Domain Module
//!
//! This module contains the client-side half of the cart, including:
//! - Domain models (CartItem, CartSnapshot, product references)
//! - Money and formatting helpers shared with the pricing engine
//! - The CartStore that mirrors the authoritative cart
//! - The notification sink for user-facing messages

pub mod helpers;
pub mod models;
pub mod notify;
pub mod store;

// Re-export commonly used types for convenience
pub use models::{CartItem, CartSnapshot, ProductId, ProductSummary};
pub use notify::{LogNotifier, Notice, NoticeLevel, Notifier};
pub use store::{CartStore, SharedCart};
