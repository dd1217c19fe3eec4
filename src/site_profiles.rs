use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use url::Url;

use crate::utils::error::{AppError, Result};

const BUILTIN_CATALOG: &str = include_str!("../config/sites.toml");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    StructuredApi,
    DirectFetch,
    BrowserHeadless,
    BrowserVisible,
    Heuristic,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::StructuredApi => "structured_api",
            StrategyKind::DirectFetch => "direct_fetch",
            StrategyKind::BrowserHeadless => "browser_headless",
            StrategyKind::BrowserVisible => "browser_visible",
            StrategyKind::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CSS selectors tried in order for each field. `selector@attr` reads an
/// attribute instead of the element text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectorRules {
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub price: Vec<String>,
    #[serde(default)]
    pub original_price: Vec<String>,
    #[serde(default)]
    pub discount: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
}

impl SelectorRules {
    pub fn is_empty(&self) -> bool {
        self.price.is_empty()
    }
}

/// JSON product endpoint. Field paths are JSON pointers into the response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiRule {
    /// Regex with one capture group pulling the product id out of the page URL.
    pub id_pattern: String,
    /// Endpoint template; `{id}` is replaced with the captured id.
    pub endpoint: String,
    pub price: String,
    pub title: Option<String>,
    pub original_price: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BrowserHints {
    /// Overrides the configured settle time.
    pub settle_secs: Option<u64>,
    /// Extra page markers that mean a bot challenge is still showing.
    #[serde(default)]
    pub challenge_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteProfile {
    pub name: String,
    /// `shop.com` matches the host and its subdomains; `shop.*` matches any TLD.
    pub domains: Vec<String>,
    pub strategies: Vec<StrategyKind>,
    #[serde(default)]
    pub selectors: SelectorRules,
    pub api: Option<ApiRule>,
    pub referer: Option<String>,
    #[serde(default)]
    pub browser: BrowserHints,
}

impl SiteProfile {
    pub fn matches_host(&self, host: &str) -> bool {
        self.domains.iter().any(|pattern| domain_matches(host, pattern))
    }
}

fn domain_matches(host: &str, pattern: &str) -> bool {
    let host = host.trim_start_matches("www.").to_ascii_lowercase();
    let pattern = pattern.trim_start_matches("www.").to_ascii_lowercase();

    if let Some(base) = pattern.strip_suffix(".*") {
        // Any label boundary followed by `base.` and a TLD
        let prefix = format!("{}.", base);
        return host.starts_with(&prefix) || host.contains(&format!(".{}", prefix));
    }

    host == pattern || host.ends_with(&format!(".{}", pattern))
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "site")]
    sites: Vec<SiteProfile>,
}

/// Ordered table of site profiles; the first matching profile wins.
#[derive(Debug, Clone, Default)]
pub struct SiteCatalog {
    profiles: Vec<Arc<SiteProfile>>,
}

impl SiteCatalog {
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(raw)?;
        let profiles = file.sites;
        for profile in &profiles {
            validate_profile(profile)?;
        }
        Ok(Self {
            profiles: profiles.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn from_profiles(profiles: Vec<SiteProfile>) -> Result<Self> {
        for profile in &profiles {
            validate_profile(profile)?;
        }
        Ok(Self {
            profiles: profiles.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn classify(&self, url: &str) -> Option<Arc<SiteProfile>> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        self.profiles
            .iter()
            .find(|profile| profile.matches_host(host))
            .cloned()
    }

    /// Profile (if any) and the ordered strategy chain for `url`.
    /// Unclassified sites only get the heuristic extractor.
    pub fn chain_for(&self, url: &str) -> (Option<Arc<SiteProfile>>, Vec<StrategyKind>) {
        match self.classify(url) {
            Some(profile) => {
                let chain = profile.strategies.clone();
                (Some(profile), chain)
            }
            None => (None, vec![StrategyKind::Heuristic]),
        }
    }
}

fn validate_profile(profile: &SiteProfile) -> Result<()> {
    let invalid = |message: String| AppError::Validation(format!("site '{}': {}", profile.name, message));

    if profile.domains.is_empty() {
        return Err(invalid("no domains".into()));
    }
    if profile.strategies.is_empty() {
        return Err(invalid("empty strategy chain".into()));
    }
    if profile.strategies.contains(&StrategyKind::StructuredApi) {
        let api = profile
            .api
            .as_ref()
            .ok_or_else(|| invalid("structured_api strategy without [site.api]".into()))?;
        let pattern = Regex::new(&api.id_pattern).map_err(|e| invalid(format!("id_pattern: {}", e)))?;
        if pattern.captures_len() < 2 {
            return Err(invalid("id_pattern needs a capture group".into()));
        }
        if !api.endpoint.contains("{id}") {
            return Err(invalid("api endpoint lacks {id}".into()));
        }
    }
    let needs_selectors = profile.strategies.iter().any(|s| {
        matches!(
            s,
            StrategyKind::DirectFetch | StrategyKind::BrowserHeadless | StrategyKind::BrowserVisible
        )
    });
    if needs_selectors && profile.selectors.is_empty() {
        return Err(invalid("page strategies need price selectors".into()));
    }
    Ok(())
}
