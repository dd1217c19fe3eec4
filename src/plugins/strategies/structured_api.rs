use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use super::http::build_client;
use crate::config::ScraperConfig;
use crate::normalizer::{parse_price, RawProduct};
use crate::plugins::traits::{ExtractionStrategy, ExtractionTarget};
use crate::site_profiles::{ApiRule, StrategyKind};
use crate::utils::error::{AppError, ExtractionError};

/// Reads product data from a shop's own JSON endpoint.
pub struct StructuredApiStrategy {
    client: Client,
}

impl StructuredApiStrategy {
    pub fn new(config: &ScraperConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config, None)?,
        })
    }
}

fn product_endpoint(rule: &ApiRule, url: &str) -> Result<String, ExtractionError> {
    let pattern = Regex::new(&rule.id_pattern)
        .map_err(|e| ExtractionError::Parse(format!("bad id pattern: {}", e)))?;
    let id = pattern
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| ExtractionError::Parse(format!("no product id in {}", url)))?;
    Ok(rule.endpoint.replace("{id}", id))
}

/// Numbers are taken as-is; strings are machine formatted first and shop
/// formatted as a fallback.
fn json_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|p| *p > 0.0),
        Value::String(s) => Decimal::from_str(s.trim())
            .ok()
            .and_then(|d| d.to_f64())
            .filter(|p| *p > 0.0)
            .or_else(|| parse_price(s)),
        _ => None,
    }
}

fn json_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn read_product(rule: &ApiRule, body: &Value) -> Result<RawProduct, ExtractionError> {
    let price = body
        .pointer(&rule.price)
        .and_then(json_price)
        .ok_or_else(|| ExtractionError::Parse(format!("no price at {}", rule.price)))?;

    let field = |pointer: &Option<String>| pointer.as_deref().and_then(|p| body.pointer(p));

    Ok(RawProduct {
        title: field(&rule.title).and_then(json_text),
        price: Some(price),
        original_price: field(&rule.original_price).and_then(json_price),
        discount_percent: None,
        image: field(&rule.image).and_then(json_text),
    })
}

#[async_trait]
impl ExtractionStrategy for StructuredApiStrategy {
    fn name(&self) -> &str {
        "Structured API"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::StructuredApi
    }

    fn description(&self) -> &str {
        "Calls the shop's JSON product endpoint"
    }

    async fn extract(&self, target: &ExtractionTarget) -> Result<RawProduct, ExtractionError> {
        let rule = target
            .profile
            .as_ref()
            .and_then(|profile| profile.api.as_ref())
            .ok_or_else(|| ExtractionError::UnsupportedSite(format!("no API rule for {}", target.url)))?;

        let endpoint = product_endpoint(rule, &target.url)?;
        tracing::debug!("Querying product API {}", endpoint);

        let response = self
            .client
            .get(&endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Transport(format!(
                "HTTP {} from {}",
                status.as_u16(),
                endpoint
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(format!("invalid JSON from {}: {}", endpoint, e)))?;
        read_product(rule, &body)
    }
}
