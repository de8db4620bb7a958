//! Chart generation models

use chrono::{DateTime, Utc};

/// A single data point on a price chart
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// All points of one asset, ordered by timestamp
#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub asset_id: String,
    pub label: String,
    pub color: Option<String>,
    pub currency: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    /// Percentage change of every point against the previous one.
    /// The first point, and any point following a zero price, gets 0.
    pub fn pct_changes(&self) -> Vec<f64> {
        let mut changes = Vec::with_capacity(self.points.len());
        let mut previous: Option<f64> = None;
        for point in &self.points {
            let change = match previous {
                Some(prev) if prev != 0.0 => (point.price - prev) / prev * 100.0,
                _ => 0.0,
            };
            changes.push(change);
            previous = Some(point.price);
        }
        changes
    }

    /// Simple moving average; `None` until `window` points are available
    pub fn moving_average(&self, window: usize) -> Vec<Option<f64>> {
        if window == 0 {
            return vec![None; self.points.len()];
        }
        let mut sum = 0.0;
        let mut averages = Vec::with_capacity(self.points.len());
        for (i, point) in self.points.iter().enumerate() {
            sum += point.price;
            if i >= window {
                sum -= self.points[i - window].price;
            }
            if i + 1 >= window {
                averages.push(Some(sum / window as f64));
            } else {
                averages.push(None);
            }
        }
        averages
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Change of the last point against the one before it
    pub fn last_change(&self) -> f64 {
        self.pct_changes().last().copied().unwrap_or(0.0)
    }
}

/// Average percentage change across all assets observed at one timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBar {
    pub timestamp: DateTime<Utc>,
    pub avg_pct: f64,
}
