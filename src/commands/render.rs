use tracing::info;

use crate::config::Settings;
use crate::services::chart_service;
use crate::utils::errors::MonitorError;

/// Rebuild the dashboard from the existing history without fetching
pub fn execute(settings: &Settings) -> Result<(), MonitorError> {
    info!("Re-rendering dashboard from {}", settings.csv_path.display());
    let summary = chart_service::render_dashboard(settings)?;

    println!(
        "Dashboard written to {} ({} series, {} points)",
        summary.output_path.display(),
        summary.series_count,
        summary.point_count
    );
    Ok(())
}
