//! JSON-over-HTTP authority client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{AddItemRequest, AuthorityError, AuthorityResult, PricingAuthority, UpdateItemRequest};
use crate::cart::models::{CartSnapshot, ProductId};
use crate::checkout::coupon::{CouponOffer, CouponVerdict};
use crate::checkout::models::{CheckoutRequest, Order};

/// Header the authority keys carts by.
pub const CART_ID_HEADER: &str = "x-cart-id";

/// Error body returned by the authority: `{"detail": "..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Serialize)]
struct CouponBody<'a> {
    code: &'a str,
}

impl From<reqwest::Error> for AuthorityError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthorityError::Timeout
        } else if err.is_decode() {
            AuthorityError::Decode(err.to_string())
        } else {
            AuthorityError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: String,
    cart_id: String,
}

impl HttpAuthority {
    pub fn new(
        base_url: &str,
        cart_id: impl Into<String>,
        timeout: Duration,
    ) -> AuthorityResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cart_id: cart_id.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cart_id(&self) -> &str {
        &self.cart_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> AuthorityResult<T> {
        let response = request.header(CART_ID_HEADER, &self.cart_id).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            let detail = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.detail)
                .unwrap_or(text);
            debug!(status = status.as_u16(), %detail, "Authority rejected request");
            return Err(match status {
                StatusCode::CONFLICT => AuthorityError::Conflict { detail },
                _ => AuthorityError::Rejected {
                    status: status.as_u16(),
                    detail,
                },
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PricingAuthority for HttpAuthority {
    async fn get_cart(&self) -> AuthorityResult<CartSnapshot> {
        self.send(self.client.get(self.url("/api/cart"))).await
    }

    async fn add_item(&self, request: AddItemRequest) -> AuthorityResult<CartSnapshot> {
        let url = self.url("/api/cart");
        self.send(self.client.post(url).json(&request)).await
    }

    async fn remove_item(&self, product_id: ProductId) -> AuthorityResult<CartSnapshot> {
        let url = self.url(&format!("/api/cart/{}", product_id));
        self.send(self.client.delete(url)).await
    }

    async fn update_item(
        &self,
        product_id: ProductId,
        request: UpdateItemRequest,
    ) -> AuthorityResult<CartSnapshot> {
        let url = self.url(&format!("/api/cart/{}", product_id));
        self.send(self.client.put(url).json(&request)).await
    }

    async fn clear_cart(&self) -> AuthorityResult<CartSnapshot> {
        self.send(self.client.delete(self.url("/api/cart"))).await
    }

    async fn validate_coupon(&self, code: &str) -> AuthorityResult<CouponVerdict> {
        let body = CouponBody { code };
        let url = self.url("/api/cart/apply-coupon");
        self.send(self.client.post(url).json(&body)).await
    }

    async fn list_coupons(&self) -> AuthorityResult<Vec<CouponOffer>> {
        let url = self.url("/api/cart/coupons");
        self.send(self.client.get(url)).await
    }

    async fn checkout(&self, request: CheckoutRequest) -> AuthorityResult<Order> {
        let url = self.url("/api/cart/checkout");
        self.send(self.client.post(url).json(&request)).await
    }
}
