//! Threshold alert models

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Price reached or crossed the upper threshold
    Above,
    /// Price reached or fell below the lower threshold
    Below,
}

/// A threshold crossed by a freshly fetched price
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub asset_id: String,
    pub label: String,
    pub price: f64,
    pub currency: String,
    pub threshold: f64,
    pub kind: AlertKind,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.kind {
            AlertKind::Above => "≥",
            AlertKind::Below => "≤",
        };
        write!(
            f,
            "ALERT: {} {} {} → {:.2} {}",
            self.label,
            op,
            self.threshold,
            self.price,
            self.currency.to_uppercase()
        )
    }
}
