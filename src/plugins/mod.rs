pub mod manager;
pub mod notifiers;
pub mod strategies;
pub mod traits;

pub use manager::PluginManager;
pub use traits::{ExtractionStrategy, ExtractionTarget, NotifierPlugin, PriceAlert};
