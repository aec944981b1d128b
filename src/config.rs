//! Runtime configuration read from environment variables.

use rust_decimal::Decimal;
use std::{path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

use crate::pricing::PricingRules;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Port the authority service listens on
    pub port: u16,
    /// Base URL clients use to reach the authority
    pub authority_url: String,
    /// Cart to address; a fresh id is generated when unset
    pub cart_id: Option<String>,
    pub request_timeout: Duration,
    /// How long a coupon message stays visible
    pub coupon_message_ttl: Duration,
    pub catalog_path: PathBuf,
    pub pricing: PricingRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            authority_url: "http://localhost:8000".to_string(),
            cart_id: None,
            request_timeout: Duration::from_millis(10_000),
            coupon_message_ttl: Duration::from_millis(3_000),
            catalog_path: PathBuf::from("data/products.json"),
            pricing: PricingRules::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Unset or blank keys
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            authority_url: get("AUTHORITY_URL").unwrap_or(defaults.authority_url),
            cart_id: get("CART_ID"),
            request_timeout: parse(&get, "REQUEST_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            coupon_message_ttl: parse(&get, "COUPON_MESSAGE_TTL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.coupon_message_ttl),
            catalog_path: get("CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_path),
            pricing: PricingRules {
                free_delivery_threshold: parse::<Decimal>(&get, "FREE_DELIVERY_THRESHOLD")?
                    .unwrap_or(defaults.pricing.free_delivery_threshold),
                delivery_charge: parse::<Decimal>(&get, "DELIVERY_CHARGE")?
                    .unwrap_or(defaults.pricing.delivery_charge),
            },
        })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.coupon_message_ttl, Duration::from_secs(3));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "9100"),
            ("CART_ID", "kiosk-1"),
            ("REQUEST_TIMEOUT_MS", "2500"),
            ("FREE_DELIVERY_THRESHOLD", "1499.50"),
            ("CATALOG_PATH", " "),
        ]))
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.cart_id.as_deref(), Some("kiosk-1"));
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        let threshold = config.pricing.free_delivery_threshold;
        assert_eq!(threshold, Decimal::new(149950, 2));
        assert_eq!(config.catalog_path, PathBuf::from("data/products.json"));
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "PORT",
                value: "eighty".into()
            }
        );
    }
}
