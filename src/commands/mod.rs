pub mod monitor;
pub mod render;

use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::cli::Args;
use crate::config::Settings;
use crate::utils::errors::MonitorError;

/// Load the config, then run either a full cycle or a re-render
pub async fn execute(args: &Args) -> Result<(), MonitorError> {
    let settings = Settings::load(&args.config)?;

    let span = info_span!("cycle", run_id = %Uuid::new_v4());
    async {
        if args.render_only {
            render::execute(&settings)
        } else {
            monitor::execute(&settings).await
        }
    }
    .instrument(span)
    .await
}

/// Log line for a successful invocation
pub fn completion_message(args: &Args) -> &'static str {
    if args.render_only {
        "Dashboard re-rendered"
    } else {
        "Cycle complete"
    }
}
