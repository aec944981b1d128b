//! Cart-related route handlers
//!
//! Every handler addresses the cart named by the `x-cart-id` header and answers
//! with the freshly priced snapshot, a coupon verdict or an order.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::authority::http::CART_ID_HEADER;
use crate::authority::{AddItemRequest, UpdateItemRequest};
use crate::cart::models::{CartSnapshot, ProductId};
use crate::checkout::coupon::{CouponOffer, CouponVerdict};
use crate::checkout::models::{CheckoutRequest, Order};
use crate::pricing::{PricingError, SharedEngine};

pub const DEFAULT_CART_ID: &str = "default";

/// Creates routes for cart-related operations
pub fn routes() -> Router<SharedEngine> {
    Router::new()
        .route("/api/cart", get(get_cart).post(add_item).delete(clear_cart))
        .route("/api/cart/coupons", get(list_coupons))
        .route("/api/cart/apply-coupon", post(apply_coupon))
        .route("/api/cart/checkout", post(checkout))
        .route(
            "/api/cart/:product_id",
            put(update_item).delete(remove_item),
        )
}

/// Returns the cart id from the request headers, or [`DEFAULT_CART_ID`].
pub fn resolve_cart_id(headers: &HeaderMap) -> String {
    headers
        .get(CART_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_CART_ID)
        .to_string()
}

impl IntoResponse for PricingError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
        if status == StatusCode::CONFLICT {
            warn!(error = %self, "Rejected stale cart update");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
struct CouponInput {
    code: String,
}

/// Endpoint: GET /api/cart
async fn get_cart(State(engine): State<SharedEngine>, headers: HeaderMap) -> Json<CartSnapshot> {
    Json(engine.snapshot(&resolve_cart_id(&headers)))
}

/// Endpoint: POST /api/cart
async fn add_item(
    State(engine): State<SharedEngine>,
    headers: HeaderMap,
    Json(payload): Json<AddItemRequest>,
) -> Result<Json<CartSnapshot>, PricingError> {
    engine.add(&resolve_cart_id(&headers), payload).map(Json)
}

/// Endpoint: PUT /api/cart/:product_id
async fn update_item(
    State(engine): State<SharedEngine>,
    headers: HeaderMap,
    Path(product_id): Path<ProductId>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<Json<CartSnapshot>, PricingError> {
    engine
        .update(&resolve_cart_id(&headers), product_id, payload)
        .map(Json)
}

/// Endpoint: DELETE /api/cart/:product_id
async fn remove_item(
    State(engine): State<SharedEngine>,
    headers: HeaderMap,
    Path(product_id): Path<ProductId>,
) -> Json<CartSnapshot> {
    Json(engine.remove(&resolve_cart_id(&headers), product_id))
}

/// Endpoint: DELETE /api/cart
async fn clear_cart(State(engine): State<SharedEngine>, headers: HeaderMap) -> Json<CartSnapshot> {
    Json(engine.clear(&resolve_cart_id(&headers)))
}

/// Endpoint: POST /api/cart/apply-coupon
/// An unknown code is a normal answer with `valid: false`, not an error.
async fn apply_coupon(
    State(engine): State<SharedEngine>,
    Json(payload): Json<CouponInput>,
) -> Json<CouponVerdict> {
    Json(engine.validate_coupon(&payload.code))
}

/// Endpoint: GET /api/cart/coupons
async fn list_coupons(State(engine): State<SharedEngine>) -> Json<Vec<CouponOffer>> {
    Json(engine.coupons())
}

/// Endpoint: POST /api/cart/checkout
async fn checkout(
    State(engine): State<SharedEngine>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<Order>, PricingError> {
    let cart_id = resolve_cart_id(&headers);
    let order = engine.checkout(&cart_id, payload)?;
    info!("REST API CHECKOUT: {} -> {}", cart_id, order.order_id);
    Ok(Json(order))
}
