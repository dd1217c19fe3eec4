pub mod config;
pub mod database;
pub mod dispatcher;
pub mod ledger;
pub mod models;
pub mod normalizer;
pub mod notification;
pub mod plugins;
pub mod scheduler;
pub mod site_profiles;
pub mod subject_manager;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
