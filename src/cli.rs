use clap::{Parser, ValueHint};
use std::path::PathBuf;

/// Fetch crypto prices, append them to a CSV history and render an HTML dashboard.
///
/// Meant to be run periodically by an external scheduler (cron, CI).
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// YAML config file
    #[arg(
        short,
        long,
        env = "PRICE_MONITOR_CONFIG",
        default_value = "config.yaml",
        value_hint = ValueHint::FilePath
    )]
    pub config: PathBuf,

    /// Only rebuild the dashboard from the existing history
    #[arg(long)]
    pub render_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from(["price-monitor", "--config", "cfg/monitor.yaml", "--render-only"])
            .expect("flags should parse");
        assert_eq!(args.config, PathBuf::from("cfg/monitor.yaml"));
        assert!(args.render_only);
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(Args::try_parse_from(["price-monitor", "--interval", "5m"]).is_err());
    }
}
