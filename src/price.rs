use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::{Result, TradeError};

/// Spot price of one token, already validated as numeric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    /// SOL per token
    pub price_in_base_asset: f64,
    /// USD per token
    pub price_in_fiat: f64,
}

impl PriceQuote {
    /// Requires `priceInSol` and `priceInUsd` as JSON numbers. A string is a
    /// format error, never a zero price.
    pub fn from_json(v: &Value) -> Result<Self> {
        Ok(Self {
            price_in_base_asset: numeric(v, "priceInSol")?,
            price_in_fiat: numeric(v, "priceInUsd")?,
        })
    }
}

fn numeric(v: &Value, key: &str) -> Result<f64> {
    match v.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|p| p.is_finite() && *p >= 0.0)
            .ok_or_else(|| TradeError::PriceFormatInvalid(format!("{key} out of range: {n}"))),
        Some(other) => Err(TradeError::PriceFormatInvalid(format!(
            "{key} is not a number: {other}"
        ))),
        None => Err(TradeError::PriceFormatInvalid(format!("{key} missing in {v}"))),
    }
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price(&self, mint: &str) -> Result<PriceQuote>;
}

/// HTTP price feed queried as `<base_url>?ca=<mint>`.
#[derive(Clone)]
pub struct PriceClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl PriceClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            base_url,
            api_key,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl PriceSource for PriceClient {
    async fn price(&self, mint: &str) -> Result<PriceQuote> {
        let mut req = self.http.get(&self.base_url).query(&[("ca", mint)]);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| TradeError::PriceFormatInvalid(format!("price feed unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TradeError::PriceFormatInvalid(format!("HTTP {status}: {body}")));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| TradeError::PriceFormatInvalid(format!("malformed price body: {e}")))?;
        PriceQuote::from_json(&body)
    }
}
