//! Fetched price models

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::PriceObservation;
use crate::utils::errors::RecordError;

/// Prices returned by one fetch, all stamped with the cycle timestamp
#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub currency: String,
    /// asset_id -> price
    pub prices: HashMap<String, f64>,
}

impl PriceSnapshot {
    pub fn new(timestamp: DateTime<Utc>, currency: &str, prices: HashMap<String, f64>) -> Self {
        Self {
            timestamp,
            currency: currency.to_string(),
            prices,
        }
    }

    /// One observation per asset, in the given order.
    ///
    /// Snapshots from `price_service::fetch_snapshot` always hold every
    /// configured asset. A snapshot built any other way may not, and then
    /// nothing is returned so a partial cycle is never recorded.
    pub fn observations(&self, asset_ids: &[String]) -> Result<Vec<PriceObservation>, RecordError> {
        asset_ids
            .iter()
            .map(|id| {
                let price = self
                    .prices
                    .get(id)
                    .copied()
                    .ok_or_else(|| RecordError::MissingPrice(id.clone()))?;
                Ok(PriceObservation {
                    timestamp: self.timestamp,
                    asset_id: id.clone(),
                    price,
                    currency: self.currency.clone(),
                })
            })
            .collect()
    }
}
