//! History record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One asset price at one instant; a single row of the history file.
///
/// Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub timestamp: DateTime<Utc>,
    pub asset_id: String,
    pub price: f64,
    pub currency: String,
}

impl PriceObservation {
    /// CSV header written when the history file is created
    pub const HEADER: [&'static str; 4] = ["timestamp", "asset_id", "price", "currency"];
}
