//! Routing module for the pricing authority service

use crate::pricing::SharedEngine;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod cart;

/// Creates and configures the application router with all routes and middleware
pub fn create_app_router(engine: SharedEngine) -> Router {
    // Middleware: CORS (Permissive for local dev)
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(cart::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(engine)
}

/// Endpoint: GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
