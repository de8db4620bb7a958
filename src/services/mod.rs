pub mod alert_service;
pub mod chart_service;
pub mod history_service;
pub mod price_service;
