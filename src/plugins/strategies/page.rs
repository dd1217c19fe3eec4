//! Selector-driven extraction over rendered or fetched HTML.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::normalizer::{parse_discount, parse_price, RawProduct};
use crate::site_profiles::SelectorRules;

/// Markers of interstitial anti-bot pages.
pub const CHALLENGE_MARKERS: &[&str] = &[
    "Access Denied",
    "Just a moment",
    "please wait",
    "verifying you are human",
    "Enter the characters you see below",
    "cf-chl-",
];

/// First challenge marker present in `html`, case-insensitive.
pub fn challenge_marker(html: &str, extra: &[String]) -> Option<String> {
    let haystack = html.to_lowercase();
    CHALLENGE_MARKERS
        .iter()
        .map(|m| m.to_string())
        .chain(extra.iter().cloned())
        .find(|marker| haystack.contains(&marker.to_lowercase()))
}

/// Splits `css@attr` into the selector and the attribute to read.
fn split_rule(rule: &str) -> (&str, Option<&str>) {
    match rule.rsplit_once('@') {
        Some((css, attr)) if !attr.is_empty() && !attr.contains([']', ' ', '\'']) => (css, Some(attr)),
        _ => (rule, None),
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Values produced by each rule, in document order, skipping blanks and
/// selectors that fail to parse.
fn rule_values<'a>(document: &'a Html, rule: &'a str) -> impl Iterator<Item = String> + 'a {
    let (css, attr) = split_rule(rule);
    let selector = Selector::parse(css).ok();
    selector
        .into_iter()
        .flat_map(move |selector| {
            document
                .select(&selector)
                .filter_map(|element| match attr {
                    Some(attr) => element.value().attr(attr).map(str::to_string),
                    None => Some(element_text(&element)),
                })
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>()
        })
}

fn first_text(document: &Html, rules: &[String]) -> Option<String> {
    rules.iter().find_map(|rule| rule_values(document, rule).next())
}

fn first_parsed<T>(document: &Html, rules: &[String], parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    rules
        .iter()
        .find_map(|rule| rule_values(document, rule).find_map(|value| parse(&value)))
}

fn absolutize(base: &str, link: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(link))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| link.to_string())
}

/// Applies a profile's selector rules to a page.
pub fn extract_with_rules(html: &str, rules: &SelectorRules, page_url: &str) -> RawProduct {
    let document = Html::parse_document(html);

    let image = rules.image.iter().find_map(|rule| {
        let rule = if split_rule(rule).1.is_none() {
            format!("{}@src", rule)
        } else {
            rule.clone()
        };
        rule_values(&document, &rule).next()
    });

    RawProduct {
        title: first_text(&document, &rules.title),
        price: first_parsed(&document, &rules.price, parse_price),
        original_price: first_parsed(&document, &rules.original_price, parse_price),
        discount_percent: first_parsed(&document, &rules.discount, parse_discount),
        image: image.map(|link| absolutize(page_url, &link)),
    }
}

/// `og:title`, falling back to `<title>`.
pub fn page_title(document: &Html) -> Option<String> {
    first_text(
        document,
        &[
            "meta[property='og:title']@content".to_string(),
            "title".to_string(),
        ],
    )
}

pub fn page_image(document: &Html, page_url: &str) -> Option<String> {
    first_text(document, &["meta[property='og:image']@content".to_string()])
        .map(|link| absolutize(page_url, &link))
}
