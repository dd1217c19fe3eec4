//! Turns scraped text into prices and fills the fields that can be derived
//! from each other.

use regex::Regex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

/// Product data as a strategy found it, before and after completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProduct {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub discount_percent: Option<f64>,
    pub image: Option<String>,
}

impl RawProduct {
    pub fn has_price(&self) -> bool {
        matches!(self.price, Some(p) if p > 0.0)
    }
}

fn number_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Spaces only join digit groups of three ("1 099,00")
    RE.get_or_init(|| {
        Regex::new(r"\d{1,3}(?:[ \x{a0}\x{202f}]\d{3})+(?:[.,]\d+)?|\d[\d.,]*").expect("static regex")
    })
}

fn percent_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*%").expect("static regex"))
}

/// Parses a price as written on a shop page ("1.234,56 €", "$1,299.00",
/// "19,99"). Returns `None` for anything that is not a positive number.
pub fn parse_price(text: &str) -> Option<f64> {
    let token = price_token(text)?;
    let token: String = token
        .trim_end_matches(['.', ','])
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let canonical = canonical_number(&token)?;
    let value = Decimal::from_str(&canonical).ok()?;
    if value <= Decimal::ZERO {
        return None;
    }
    value.to_f64()
}

/// The number written next to a currency symbol, else the first one.
fn price_token(text: &str) -> Option<&str> {
    let tokens: Vec<_> = number_token().find_iter(text).collect();
    tokens
        .iter()
        .find(|m| {
            let before = text[..m.start()].trim_end().chars().next_back();
            let after = text[m.end()..].trim_start().chars().next();
            before.into_iter().chain(after).any(is_currency_symbol)
        })
        .or(tokens.first())
        .map(|m| m.as_str())
}

fn is_currency_symbol(c: char) -> bool {
    matches!(c, '€' | '$' | '£' | '¥')
}

fn canonical_number(token: &str) -> Option<String> {
    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');

    let decimal_mark = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) => lone_separator_decimal(token, '.'),
        (None, Some(_)) => lone_separator_decimal(token, ','),
        (None, None) => None,
    };

    let mut out = String::with_capacity(token.len());
    match decimal_mark {
        Some(mark) => {
            let split = token.rfind(mark)?;
            out.extend(token[..split].chars().filter(|c| c.is_ascii_digit()));
            out.push('.');
            out.push_str(&token[split + 1..]);
        }
        None => out.extend(token.chars().filter(|c| c.is_ascii_digit())),
    }

    if out.is_empty() || out.starts_with('.') {
        return None;
    }
    Some(out)
}

/// A single kind of separator is a decimal mark unless it repeats or is
/// followed by exactly three digits.
fn lone_separator_decimal(token: &str, sep: char) -> Option<char> {
    if token.matches(sep).count() > 1 {
        return None;
    }
    let tail = token.rsplit(sep).next().unwrap_or("");
    if tail.len() == 3 { None } else { Some(sep) }
}

/// Reads "-20%", "20 %", "Ahorra 12,5%".
pub fn parse_discount(text: &str) -> Option<f64> {
    let caps = percent_token().captures(text)?;
    let value = Decimal::from_str(&caps[1].replace(',', ".")).ok()?;
    if value <= Decimal::ZERO || value >= Decimal::ONE_HUNDRED {
        return None;
    }
    value.to_f64()
}

pub fn round_to(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Drops non-positive values and fills whichever of `original_price` or
/// `discount_percent` can be derived from the other.
pub fn complete(mut product: RawProduct) -> RawProduct {
    product.price = product.price.filter(|p| *p > 0.0);
    product.original_price = product.original_price.filter(|p| *p > 0.0);
    product.discount_percent = product.discount_percent.filter(|d| *d > 0.0 && *d < 100.0);
    product.title = product
        .title
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    let Some(price) = product.price else {
        return product;
    };

    if let Some(original) = product.original_price {
        if original <= price {
            product.original_price = None;
        }
    }

    match (product.original_price, product.discount_percent) {
        (None, Some(discount)) => {
            product.original_price = Some(round2(price / (1.0 - discount / 100.0)));
        }
        (Some(original), None) => {
            product.discount_percent = Some(round_to((original - price) / original * 100.0, 0));
        }
        _ => {}
    }

    product
}
