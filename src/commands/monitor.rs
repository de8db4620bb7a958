use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::Settings;
use crate::models::{Alert, PriceSnapshot};
use crate::services::alert_service::{self, TelegramNotifier};
use crate::services::chart_service::{self, DashboardSummary};
use crate::services::{history_service, price_service};
use crate::utils::errors::MonitorError;
use crate::utils::{format_price, Table};

/// Outcome of one fetch → record → render → alert cycle
#[derive(Debug)]
pub struct CycleReport {
    pub snapshot: PriceSnapshot,
    pub rows_appended: usize,
    pub dashboard: DashboardSummary,
    pub alerts: Vec<Alert>,
    pub alerts_delivered: bool,
}

/// Run one cycle. Nothing is written unless every configured asset was fetched.
pub async fn run_cycle(
    settings: &Settings,
    timestamp: DateTime<Utc>,
    notifier: Option<&TelegramNotifier>,
) -> Result<CycleReport, MonitorError> {
    let snapshot = price_service::fetch_snapshot(settings, timestamp).await?;

    let observations = snapshot.observations(&settings.asset_ids)?;
    let rows_appended = history_service::append_observations(&settings.csv_path, &observations)?;
    info!("Recorded {} observations in {}", rows_appended, settings.csv_path.display());

    let dashboard = chart_service::render_dashboard(settings)?;

    let alerts = alert_service::check_alerts(&snapshot, settings);
    let alerts_delivered = if settings.alerts.enabled {
        alert_service::dispatch_alerts(&alerts, notifier).await
    } else {
        false
    };

    Ok(CycleReport {
        snapshot,
        rows_appended,
        dashboard,
        alerts,
        alerts_delivered,
    })
}

/// Plain text summary printed after a successful cycle
pub fn summary(report: &CycleReport, settings: &Settings) -> String {
    let mut table = Table::new(vec!["Asset", "Price"]);
    for asset_id in &settings.asset_ids {
        if let Some(price) = report.snapshot.prices.get(asset_id) {
            table.add_row(vec![
                settings.label_for(asset_id).to_string(),
                format_price(*price, &report.snapshot.currency),
            ]);
        }
    }

    let mut out = format!(
        "[{}] {} prices recorded\n{}Dashboard: {} ({} points)\n",
        report.snapshot.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
        report.rows_appended,
        table.render(),
        report.dashboard.output_path.display(),
        report.dashboard.point_count
    );
    if !report.alerts.is_empty() {
        let suffix = if report.alerts_delivered { " (sent to Telegram)" } else { "" };
        out.push_str(&format!("ALERTS{}:\n", suffix));
        for alert in &report.alerts {
            out.push_str(&format!(" - {}\n", alert));
        }
    }
    out
}

pub async fn execute(settings: &Settings) -> Result<(), MonitorError> {
    info!(
        "📈 Monitoring {} assets in {}",
        settings.asset_ids.len(),
        settings.currency.to_uppercase()
    );

    let notifier = if settings.alerts.enabled {
        alert_service::notifier_from_settings(settings)
    } else {
        None
    };

    let report = run_cycle(settings, Utc::now(), notifier.as_ref()).await?;
    print!("{}", summary(&report, settings));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::history_service::{append_observations, scratch_path};
    use crate::models::PriceObservation;
    use crate::utils::errors::{FetchError, RecordError};
    use mockito::Matcher;
    use std::fs;
    use std::path::Path;

    fn settings(api_url: &str, dir: &Path, extra: &str) -> Settings {
        let yaml = format!(
            "asset_ids: [bitcoin, ethereum]\ncurrency: usd\ncsv_path: '{}'\nhtml_output_path: '{}'\napi_url: '{}'\nrequest_timeout_secs: 5\nchart:\n  static_snapshot: false\n{}",
            dir.join("history.csv").display(),
            dir.join("site/index.html").display(),
            api_url,
            extra
        );
        Settings::from_yaml_str(&yaml).expect("test config")
    }

    async fn price_server(body: &str, status: usize) -> mockito::ServerGuard {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;
        server
    }

    #[tokio::test]
    async fn test_cycle_records_and_renders() {
        let server = price_server(r#"{"bitcoin":{"usd":65000.0},"ethereum":{"usd":3200.0}}"#, 200).await;
        let dir = scratch_path("");
        let s = settings(&format!("{}/simple/price", server.url()), &dir, "");

        let first = run_cycle(&s, Utc::now(), None).await.expect("first cycle");
        let second = run_cycle(&s, Utc::now(), None).await.expect("second cycle");

        assert_eq!(first.rows_appended, 2);
        assert_eq!(second.rows_appended, 2);
        let csv = fs::read_to_string(&s.csv_path).unwrap();
        assert_eq!(csv.lines().count(), 5);

        assert_eq!(second.dashboard.series_count, 2);
        assert_eq!(second.dashboard.point_count, 4);
        assert!(s.html_output_path.exists());
        assert!(first.alerts.is_empty());
        assert!(!first.alerts_delivered);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_history_untouched() {
        let server = price_server(r#"{"error":"boom"}"#, 500).await;
        let dir = scratch_path("");
        let s = settings(&format!("{}/simple/price", server.url()), &dir, "");

        let seeded = vec![PriceObservation {
            timestamp: Utc::now(),
            asset_id: "bitcoin".to_string(),
            price: 64000.0,
            currency: "usd".to_string(),
        }];
        append_observations(&s.csv_path, &seeded).unwrap();
        let before = fs::read(&s.csv_path).unwrap();

        let err = run_cycle(&s, Utc::now(), None).await.unwrap_err();

        assert!(matches!(err, MonitorError::Fetch(FetchError::ServerError(500, _))));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(fs::read(&s.csv_path).unwrap(), before);
        assert!(!s.html_output_path.exists());
    }

    #[tokio::test]
    async fn test_partial_response_writes_nothing() {
        let server = price_server(r#"{"bitcoin":{"usd":65000.0}}"#, 200).await;
        let dir = scratch_path("");
        let s = settings(&format!("{}/simple/price", server.url()), &dir, "");

        let err = run_cycle(&s, Utc::now(), None).await.unwrap_err();

        assert!(matches!(err, MonitorError::Fetch(FetchError::MissingAsset { .. })));
        assert!(!s.csv_path.exists());
    }

    #[tokio::test]
    async fn test_foreign_history_layout_is_a_record_error() {
        let server = price_server(r#"{"bitcoin":{"usd":65000.0},"ethereum":{"usd":3200.0}}"#, 200).await;
        let dir = scratch_path("");
        let s = settings(&format!("{}/simple/price", server.url()), &dir, "");

        fs::create_dir_all(&dir).unwrap();
        fs::write(&s.csv_path, "timestamp,bitcoin,ethereum\n2024-05-01T12:00:00Z,64000,3100\n").unwrap();
        let before = fs::read(&s.csv_path).unwrap();

        let err = run_cycle(&s, Utc::now(), None).await.unwrap_err();

        assert!(matches!(err, MonitorError::Record(RecordError::HeaderMismatch { .. })));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(fs::read(&s.csv_path).unwrap(), before);
        assert!(!s.html_output_path.exists());
    }

    #[tokio::test]
    async fn test_alerts_are_forwarded_when_enabled() {
        let server = price_server(r#"{"bitcoin":{"usd":75000.0},"ethereum":{"usd":3200.0}}"#, 200).await;
        let mut telegram = mockito::Server::new_async().await;
        let sent = telegram
            .mock("POST", "/botT/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = scratch_path("");
        let s = settings(
            &format!("{}/simple/price", server.url()),
            &dir,
            "assets:\n  bitcoin:\n    upper: 70000\nalerts:\n  enabled: true",
        );
        let notifier = TelegramNotifier::with_base_url(&telegram.url(), "T", "1").unwrap();

        let report = run_cycle(&s, Utc::now(), Some(&notifier)).await.expect("cycle");

        sent.assert_async().await;
        assert_eq!(report.alerts.len(), 1);
        assert!(report.alerts_delivered);

        let text = summary(&report, &s);
        assert!(text.contains("2 prices recorded"));
        assert!(text.contains("75000.00 USD"));
        assert!(text.contains("ALERTS (sent to Telegram):"));
    }

    #[tokio::test]
    async fn test_alerts_stay_local_when_disabled() {
        let server = price_server(r#"{"bitcoin":{"usd":75000.0},"ethereum":{"usd":3200.0}}"#, 200).await;
        let mut telegram = mockito::Server::new_async().await;
        let sent = telegram
            .mock("POST", "/botT/sendMessage")
            .expect(0)
            .create_async()
            .await;

        let dir = scratch_path("");
        let s = settings(
            &format!("{}/simple/price", server.url()),
            &dir,
            "assets:\n  bitcoin:\n    upper: 70000",
        );
        let notifier = TelegramNotifier::with_base_url(&telegram.url(), "T", "1").unwrap();

        let report = run_cycle(&s, Utc::now(), Some(&notifier)).await.expect("cycle");

        sent.assert_async().await;
        assert_eq!(report.alerts.len(), 1);
        assert!(!report.alerts_delivered);
    }
}
