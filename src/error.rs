use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed exchange response: {0}")]
    MalformedResponse(String),

    #[error("binance API error (code {code}): {msg}")]
    BinanceApi { code: i64, msg: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model error: {0}")]
    Model(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Errors the poll loop retries with backoff instead of giving up on the tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Network(_)
                | AppError::MalformedResponse(_)
                | AppError::BinanceApi { .. }
                | AppError::Http(_)
                | AppError::Json(_)
        )
    }

    /// Errors that abort startup rather than a single cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

/// Classify an `anyhow` chain by the first `AppError` it carries.
pub fn classify(err: &anyhow::Error) -> Option<&AppError> {
    err.chain().find_map(|cause| cause.downcast_ref::<AppError>())
}
