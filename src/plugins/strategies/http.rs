use reqwest::cookie::Jar;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ScraperConfig;
use crate::utils::error::{AppError, ExtractionError};

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Headers a desktop browser would send on a top-level navigation.
pub fn browser_headers(config: &ScraperConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    if let Ok(lang) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(header::ACCEPT_LANGUAGE, lang);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

pub fn build_client(config: &ScraperConfig, jar: Option<Arc<Jar>>) -> Result<Client, AppError> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(browser_headers(config))
        .timeout(Duration::from_secs(config.request_timeout))
        .redirect(reqwest::redirect::Policy::limited(10));
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    Ok(builder.build()?)
}

/// GETs `url` and returns the body of a 2xx response.
pub async fn fetch_html(
    client: &Client,
    url: &str,
    referer: Option<&str>,
) -> Result<String, ExtractionError> {
    let mut request = client.get(url);
    if let Some(referer) = referer {
        request = request.header(header::REFERER, referer);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ExtractionError::Transport(format!("HTTP {} from {}", status.as_u16(), url)));
    }
    Ok(response.text().await?)
}
