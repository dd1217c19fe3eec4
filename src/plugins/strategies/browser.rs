use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use super::heuristic::extract_heuristically;
use super::page::{challenge_marker, extract_with_rules};
use crate::config::BrowserConfig;
use crate::normalizer::RawProduct;
use crate::plugins::traits::{ExtractionStrategy, ExtractionTarget};
use crate::site_profiles::StrategyKind;
use crate::utils::error::ExtractionError;

/// Everything the blocking browser thread needs, owned.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub url: String,
    pub user_agent: String,
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub settle: Duration,
    pub backoff: Duration,
    pub rounds: u32,
    pub extra_markers: Vec<String>,
    pub deadline: Instant,
}

/// Produces the HTML of a fully rendered page. Runs on a blocking thread.
pub trait PageRenderer: Send + Sync {
    fn render(&self, job: &RenderJob) -> Result<String, ExtractionError>;
}

/// Renders through a local Chrome install.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeRenderer;

/// Drives Chrome so client-side rendering and anti-bot scripts run before
/// the page is read.
pub struct BrowserStrategy {
    config: BrowserConfig,
    user_agent: String,
    headless: bool,
    renderer: Arc<dyn PageRenderer>,
    render_slot: Arc<Semaphore>,
}

impl BrowserStrategy {
    pub fn headless(config: BrowserConfig, user_agent: String) -> Self {
        Self::new(config, user_agent, true)
    }

    /// A visible window gets past some fingerprinting that flags headless runs.
    pub fn visible(config: BrowserConfig, user_agent: String) -> Self {
        Self::new(config, user_agent, false)
    }

    fn new(config: BrowserConfig, user_agent: String, headless: bool) -> Self {
        Self {
            config,
            user_agent,
            headless,
            renderer: Arc::new(ChromeRenderer),
            render_slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Strategies holding the same slot never run two browsers at once. The
    /// permit stays with the render thread, so a run abandoned on timeout
    /// still blocks the next one until it exits.
    pub fn with_render_slot(mut self, slot: Arc<Semaphore>) -> Self {
        self.render_slot = slot;
        self
    }
}

fn browser_error(stage: &str, err: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Transport(format!("browser {}: {}", stage, err))
}

/// Waits `settle`, then re-reads the page with a growing backoff while it
/// still shows a challenge. Gives up with `BotChallenge` after `rounds`
/// retries or when the next wait would pass the deadline.
pub fn wait_out_challenges(
    job: &RenderJob,
    mut read_content: impl FnMut() -> Result<String, ExtractionError>,
) -> Result<String, ExtractionError> {
    std::thread::sleep(job.settle);
    let mut content = read_content()?;

    let mut round = 0;
    while let Some(marker) = challenge_marker(&content, &job.extra_markers) {
        round += 1;
        let wait = job.backoff * round;
        if round > job.rounds || Instant::now() + wait >= job.deadline {
            return Err(ExtractionError::BotChallenge(marker));
        }
        tracing::debug!("Challenge '{}' on {}, waiting {:?}", marker, job.url, wait);
        std::thread::sleep(wait);
        content = read_content()?;
    }
    Ok(content)
}

impl PageRenderer for ChromeRenderer {
    fn render(&self, job: &RenderJob) -> Result<String, ExtractionError> {
        let mut options = LaunchOptions::default_builder()
            .headless(job.headless)
            .sandbox(false)
            .window_size(Some((1366, 900)))
            .idle_browser_timeout(job.deadline.saturating_duration_since(Instant::now()))
            .args(vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--lang=es-ES"),
            ])
            .build()
            .map_err(|e| browser_error("options", e))?;
        if let Some(path) = &job.chrome_path {
            options.path = Some(PathBuf::from(path));
        }

        let browser = Browser::new(options).map_err(|e| browser_error("launch", e))?;
        let tab = browser.new_tab().map_err(|e| browser_error("tab", e))?;
        tab.set_user_agent(&job.user_agent, Some("es-ES,es;q=0.9"), None)
            .map_err(|e| browser_error("user agent", e))?;
        tab.navigate_to(&job.url)
            .map_err(|e| browser_error("navigate", e))?
            .wait_until_navigated()
            .map_err(|e| browser_error("load", e))?;

        let content = wait_out_challenges(job, || {
            tab.get_content().map_err(|e| browser_error("content", e))
        });
        let _ = tab.close(true);
        content
    }
}

#[async_trait]
impl ExtractionStrategy for BrowserStrategy {
    fn name(&self) -> &str {
        if self.headless {
            "Headless Browser"
        } else {
            "Visible Browser"
        }
    }

    fn kind(&self) -> StrategyKind {
        if self.headless {
            StrategyKind::BrowserHeadless
        } else {
            StrategyKind::BrowserVisible
        }
    }

    fn description(&self) -> &str {
        "Renders the page in Chrome, waits out bot challenges and applies the site's selectors"
    }

    async fn extract(&self, target: &ExtractionTarget) -> Result<RawProduct, ExtractionError> {
        let hard_timeout = self.config.hard_timeout();
        let started = Instant::now();
        let profile = target.profile.clone();
        let hints = profile.as_ref().map(|p| p.browser.clone()).unwrap_or_default();

        let job = RenderJob {
            url: target.url.clone(),
            user_agent: self.user_agent.clone(),
            headless: self.headless,
            chrome_path: self.config.chrome_path.clone(),
            settle: Duration::from_secs(hints.settle_secs.unwrap_or(self.config.settle_secs)),
            backoff: Duration::from_secs(self.config.challenge_backoff_secs),
            rounds: self.config.challenge_rounds,
            extra_markers: hints.challenge_markers,
            deadline: started + hard_timeout,
        };

        // The blocking thread cannot be interrupted; on timeout it is
        // abandoned and finishes on its own, holding the slot until then.
        let renderer = self.renderer.clone();
        let slot = self.render_slot.clone();
        let render = async move {
            let permit = slot
                .acquire_owned()
                .await
                .map_err(|e| browser_error("slot", e))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                renderer.render(&job)
            })
            .await
            .map_err(|e| browser_error("task", e))?
        };
        let html = match tokio::time::timeout(hard_timeout, render).await {
            Err(_) => {
                return Err(ExtractionError::Timeout {
                    seconds: hard_timeout.as_secs(),
                });
            }
            Ok(rendered) => rendered?,
        };

        let product = match profile.as_ref() {
            Some(profile) if !profile.selectors.is_empty() => {
                extract_with_rules(&html, &profile.selectors, &target.url)
            }
            _ => extract_heuristically(&html, &target.url).unwrap_or_default(),
        };

        if product.price.is_none() {
            return Err(ExtractionError::Parse(format!("no price in rendered page {}", target.url)));
        }
        Ok(product)
    }
}
