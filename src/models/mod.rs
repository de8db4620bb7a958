//! Data models shared by the monitor services
//!
//! Each model is the input or output of one pipeline stage.

pub mod alert;
pub mod chart;
pub mod observation;
pub mod price;

// Re-export commonly used types for convenience
pub use alert::{Alert, AlertKind};
pub use chart::{ChangeBar, PricePoint, PriceSeries};
pub use observation::PriceObservation;
pub use price::PriceSnapshot;
