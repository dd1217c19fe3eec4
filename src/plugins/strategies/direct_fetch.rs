use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::http::{build_client, fetch_html};
use super::page::{challenge_marker, extract_with_rules};
use crate::config::ScraperConfig;
use crate::normalizer::RawProduct;
use crate::plugins::traits::{ExtractionStrategy, ExtractionTarget};
use crate::site_profiles::StrategyKind;
use crate::utils::error::ExtractionError;

/// Plain HTTP GET with browser headers. Each subject keeps its own cookie
/// session for the life of the process so consent and session cookies set
/// on one visit are replayed on the next.
pub struct DirectFetchStrategy {
    config: ScraperConfig,
    sessions: Mutex<HashMap<String, Client>>,
}

impl DirectFetchStrategy {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn session(&self, subject_id: &str) -> Result<Client, ExtractionError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ExtractionError::Transport("session table poisoned".into()))?;
        if let Some(client) = sessions.get(subject_id) {
            return Ok(client.clone());
        }

        let client = build_client(&self.config, Some(Arc::new(Jar::default())))
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;
        sessions.insert(subject_id.to_string(), client.clone());
        Ok(client)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ExtractionStrategy for DirectFetchStrategy {
    fn name(&self) -> &str {
        "Direct Fetch"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectFetch
    }

    fn description(&self) -> &str {
        "Fetches the page over HTTP and applies the site's selector rules"
    }

    async fn extract(&self, target: &ExtractionTarget) -> Result<RawProduct, ExtractionError> {
        let profile = target
            .profile
            .as_ref()
            .ok_or_else(|| ExtractionError::UnsupportedSite(format!("no selector rules for {}", target.url)))?;

        let client = self.session(&target.subject_id)?;
        let html = fetch_html(&client, &target.url, profile.referer.as_deref()).await?;

        let product = extract_with_rules(&html, &profile.selectors, &target.url);
        if product.price.is_some() {
            return Ok(product);
        }

        if let Some(marker) = challenge_marker(&html, &profile.browser.challenge_markers) {
            return Err(ExtractionError::BotChallenge(marker));
        }
        Err(ExtractionError::Parse(format!(
            "no price matched {} selector(s) on {}",
            profile.selectors.price.len(),
            target.url
        )))
    }
}
