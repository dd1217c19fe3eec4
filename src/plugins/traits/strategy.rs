use async_trait::async_trait;
use std::sync::Arc;

use crate::normalizer::RawProduct;
use crate::site_profiles::{SiteProfile, StrategyKind};
use crate::utils::error::ExtractionError;

/// What a strategy is asked to extract.
#[derive(Debug, Clone)]
pub struct ExtractionTarget {
    pub subject_id: String,
    pub url: String,
    pub profile: Option<Arc<SiteProfile>>,
}

impl ExtractionTarget {
    pub fn new(subject_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            url: url.into(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: Option<Arc<SiteProfile>>) -> Self {
        self.profile = profile;
        self
    }
}

/// One way of turning a product URL into product data.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> StrategyKind;
    fn description(&self) -> &str;

    /// Raw findings; the dispatcher normalizes them and decides whether the
    /// result is usable.
    async fn extract(&self, target: &ExtractionTarget) -> Result<RawProduct, ExtractionError>;
}
