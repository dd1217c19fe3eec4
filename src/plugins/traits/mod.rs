pub mod notifier;
pub mod strategy;

pub use notifier::{NotificationResult, NotifierPlugin, PriceAlert};
pub use strategy::{ExtractionStrategy, ExtractionTarget};
