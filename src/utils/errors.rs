use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors. Raised before any network or file I/O happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors raised while fetching prices from the remote API
#[derive(Debug, Error)]
pub enum FetchError {
    /// 400 Bad Request
    #[error("Bad Request: {0}")]
    BadRequest(String),
    /// 401 Unauthorized
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// 403 Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// 404 Not Found
    #[error("Not Found: {0}")]
    NotFound(String),
    /// 429 Too Many Requests
    #[error("Rate Limited. Retry after {retry_after_secs} s")]
    RateLimited { retry_after_secs: u64 },
    /// 5xx Server Error
    #[error("Server Error ({0}): {1}")]
    ServerError(u16, String),
    /// Any other non-success status
    #[error("HTTP Error ({0}): {1}")]
    HttpError(u16, String),
    /// Network, timeout or client construction failure
    #[error("Request Error: {0}")]
    RequestError(String),
    #[error("Deserialization Error: {0}")]
    DeserializationError(String),
    #[error("No '{currency}' price for asset '{asset_id}' in response")]
    MissingAsset { asset_id: String, currency: String },
    #[error("Invalid price {price} for asset '{asset_id}'")]
    InvalidPrice { asset_id: String, price: f64 },
}

impl FetchError {
    /// Whether a single retry is worth attempting
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. } | FetchError::ServerError(..))
    }
}

/// Errors raised while appending to the history file
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("History I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode history row: {0}")]
    Csv(#[from] csv::Error),
    #[error("No price fetched for configured asset '{0}'")]
    MissingPrice(String),
    #[error("History {path} has header '{found}', refusing to append")]
    HeaderMismatch { path: PathBuf, found: String },
}

/// Errors raised while loading the history or writing the dashboard
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("History file not found: {0}")]
    MissingHistory(PathBuf),
    #[error("Malformed history {path} (line {line}): {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("History file {0} has no rows")]
    EmptyHistory(PathBuf),
    #[error("Dashboard I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode chart: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Failed to draw chart: {0}")]
    Plot(String),
}

/// Errors raised while forwarding alerts; never fatal for a cycle
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Request(String),
    #[error("Notification rejected ({0}): {1}")]
    Rejected(u16, String),
}

/// Top level error of one monitoring cycle
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl MonitorError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            MonitorError::Config(_) => 2,
            MonitorError::Fetch(_) => 3,
            MonitorError::Record(_) => 4,
            MonitorError::Render(_) => 5,
        }
    }
}
