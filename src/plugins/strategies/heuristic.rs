use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use super::http::{build_client, fetch_html};
use super::page::{page_image, page_title};
use crate::config::ScraperConfig;
use crate::normalizer::{parse_price, RawProduct};
use crate::plugins::traits::{ExtractionStrategy, ExtractionTarget};
use crate::site_profiles::StrategyKind;
use crate::utils::error::{AppError, ExtractionError};

const MAX_PLAUSIBLE_PRICE: f64 = 1_000_000.0;

const PRICE_META: &[&str] = &[
    "meta[property='og:price:amount']",
    "meta[property='product:price:amount']",
    "meta[itemprop='price']",
    "[itemprop='price']",
];

fn currency_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let amount = r"(\d{1,3}(?:[.,\s]\d{3})*(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)";
        [
            format!(r"{}\s*(?:€|EUR)", amount),
            format!(r"(?:€|EUR)\s*{}", amount),
            format!(r"(?:\$|USD|£|GBP)\s*{}", amount),
            format!(r#"class="[^"]*price[^"]*"[^>]*>\s*[^<\d]{{0,4}}{}"#, amount),
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

fn plausible(price: f64) -> bool {
    price > 0.0 && price < MAX_PLAUSIBLE_PRICE
}

fn meta_price(document: &Html) -> Option<f64> {
    PRICE_META.iter().find_map(|css| {
        let selector = Selector::parse(css).ok()?;
        document.select(&selector).find_map(|element| {
            let raw = element
                .value()
                .attr("content")
                .map(str::to_string)
                .unwrap_or_else(|| element.text().collect::<String>());
            parse_price(&raw).filter(|p| plausible(*p))
        })
    })
}

fn value_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().or_else(|| parse_price(s)),
        _ => None,
    };
    price.filter(|p| plausible(*p))
}

/// Walks JSON-LD looking for `offers.price`, `offers.lowPrice` or a bare
/// `price`, descending into arrays and `@graph`.
fn json_ld_price(value: &Value) -> Option<f64> {
    match value {
        Value::Array(items) => items.iter().find_map(json_ld_price),
        Value::Object(map) => {
            if let Some(offers) = map.get("offers") {
                let from_offers = match offers {
                    Value::Array(list) => list.iter().find_map(offer_price),
                    other => offer_price(other),
                };
                if from_offers.is_some() {
                    return from_offers;
                }
            }
            if let Some(price) = map.get("price").and_then(value_price) {
                return Some(price);
            }
            map.get("@graph").and_then(json_ld_price)
        }
        _ => None,
    }
}

fn offer_price(offer: &Value) -> Option<f64> {
    ["price", "lowPrice"]
        .iter()
        .find_map(|key| offer.get(*key).and_then(value_price))
        .or_else(|| offer.get("priceSpecification").and_then(json_ld_price))
}

fn structured_data_price(document: &Html) -> Option<f64> {
    let selector = Selector::parse("script[type='application/ld+json']").ok()?;
    document.select(&selector).find_map(|script| {
        let raw = script.text().collect::<String>();
        serde_json::from_str::<Value>(raw.trim())
            .ok()
            .and_then(|value| json_ld_price(&value))
    })
}

/// Most repeated currency amount in the raw page; ties go to the one that
/// appears first. An amount matched by several patterns counts once.
fn scanned_price(html: &str) -> Option<f64> {
    let mut amounts: BTreeMap<usize, f64> = BTreeMap::new();
    for pattern in currency_patterns() {
        for caps in pattern.captures_iter(html) {
            let Some(amount) = caps.get(1) else {
                continue;
            };
            if amounts.contains_key(&amount.start()) {
                continue;
            }
            if let Some(price) = parse_price(amount.as_str()).filter(|p| plausible(*p)) {
                amounts.insert(amount.start(), price);
            }
        }
    }

    // (occurrences, first offset, price)
    let mut counts: HashMap<i64, (usize, usize, f64)> = HashMap::new();
    for (offset, price) in amounts {
        let key = (price * 100.0).round() as i64;
        counts.entry(key).or_insert((0, offset, price)).0 += 1;
    }

    counts
        .into_values()
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, _, price)| price)
}

/// Price from meta tags, then JSON-LD, then a currency scan. `None` when the
/// page offers nothing usable.
pub fn extract_heuristically(html: &str, page_url: &str) -> Option<RawProduct> {
    let document = Html::parse_document(html);
    let price = meta_price(&document)
        .or_else(|| structured_data_price(&document))
        .or_else(|| scanned_price(html))?;

    Some(RawProduct {
        title: page_title(&document),
        price: Some(price),
        original_price: None,
        discount_percent: None,
        image: page_image(&document, page_url),
    })
}

/// Last resort for shops without a profile.
pub struct HeuristicStrategy {
    client: Client,
}

impl HeuristicStrategy {
    pub fn new(config: &ScraperConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config, None)?,
        })
    }
}

#[async_trait]
impl ExtractionStrategy for HeuristicStrategy {
    fn name(&self) -> &str {
        "Generic Heuristic"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Heuristic
    }

    fn description(&self) -> &str {
        "Price meta tags, JSON-LD offers, then a currency scan"
    }

    async fn extract(&self, target: &ExtractionTarget) -> Result<RawProduct, ExtractionError> {
        let referer = target.profile.as_ref().and_then(|p| p.referer.as_deref());
        let html = fetch_html(&self.client, &target.url, referer).await?;
        extract_heuristically(&html, &target.url)
            .ok_or_else(|| ExtractionError::UnsupportedSite(format!("no recognizable price on {}", target.url)))
    }
}
