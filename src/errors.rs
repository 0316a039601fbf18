use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    ArrowError(String),

    #[error("Invalid selector: {0}")]
    SelectorError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    RequestError(String),

    #[error("Render session failure: {0}")]
    SessionError(String),

    #[error("Render session already closed")]
    SessionClosed,

    #[error("Element {0} disappeared before it could be used")]
    ElementGone(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ScrapeError {
    // Errors that leave the render session unusable for the rest of a run
    pub fn is_session_failure(&self) -> bool {
        matches!(self, ScrapeError::SessionError(_) | ScrapeError::SessionClosed)
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

impl From<String> for ScrapeError {
    fn from(s: String) -> Self {
        ScrapeError::Unknown(s)
    }
}

impl From<&str> for ScrapeError {
    fn from(s: &str) -> Self {
        ScrapeError::Unknown(s.to_string())
    }
}

impl From<tokio::task::JoinError> for ScrapeError {
    fn from(e: tokio::task::JoinError) -> Self {
        ScrapeError::SessionError(format!("browser task failed: {}", e))
    }
}
