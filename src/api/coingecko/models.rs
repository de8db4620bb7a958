use serde::Deserialize;
use std::collections::HashMap;

/// Body of `GET /simple/price`, e.g. `{"bitcoin": {"usd": 65000.0}}`
pub type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

/// Error body returned by the API on non-success statuses.
/// The public and the pro endpoints use different shapes.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: Option<String>,
    pub status: Option<ErrorStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorStatus {
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
}

impl ErrorResponse {
    /// Human readable message, prefixed with the API error code when one is sent
    pub fn message(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        let status = self.status.as_ref()?;
        let message = status.error_message.as_deref()?;
        Some(match status.error_code {
            Some(code) => format!("[{}] {}", code, message),
            None => message.to_string(),
        })
    }
}
