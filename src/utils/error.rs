use thiserror::Error;

/// Failure of a single extraction strategy. These drive escalation inside the
/// dispatcher and never reach callers on their own.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Bot challenge not cleared: {0}")]
    BotChallenge(String),

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Unsupported site: {0}")]
    UnsupportedSite(String),
}

impl From<reqwest::Error> for ExtractionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExtractionError::Transport(format!("request timed out: {}", err))
        } else {
            ExtractionError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Site catalog error: {0}")]
    Catalog(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Every strategy in the chain failed; carries the last one's error.
    #[error("Extraction failed ({method}): {source}")]
    ExtractionFailed {
        method: String,
        #[source]
        source: ExtractionError,
    },

    #[error("Plugin error: {plugin_type}: {message}")]
    Plugin { plugin_type: String, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
