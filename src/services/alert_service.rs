use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Settings;
use crate::models::{Alert, AlertKind, PriceSnapshot};
use crate::utils::errors::NotifyError;

const TELEGRAM_API: &str = "https://api.telegram.org";
const NOTIFY_TIMEOUT_SECS: u64 = 15;

/// Compare fresh prices with the configured per-asset thresholds
pub fn check_alerts(snapshot: &PriceSnapshot, settings: &Settings) -> Vec<Alert> {
    let mut alerts = Vec::new();

    for asset_id in &settings.asset_ids {
        let (Some(asset), Some(&price)) = (settings.assets.get(asset_id), snapshot.prices.get(asset_id))
        else {
            continue;
        };

        let mut push = |threshold: f64, kind: AlertKind| {
            alerts.push(Alert {
                asset_id: asset_id.clone(),
                label: settings.label_for(asset_id).to_string(),
                price,
                currency: snapshot.currency.clone(),
                threshold,
                kind,
            })
        };

        if let Some(upper) = asset.upper {
            if price >= upper {
                push(upper, AlertKind::Above);
            }
        }
        if let Some(lower) = asset.lower {
            if price <= lower {
                push(lower, AlertKind::Below);
            }
        }
    }

    alerts
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
}

/// Telegram bot client used to forward alerts
pub struct TelegramNotifier {
    http_client: HttpClient,
    send_message_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API, bot_token, chat_id)
    }

    /// Create a notifier with custom base URL (for testing)
    pub fn with_base_url(base_url: &str, bot_token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        Ok(Self {
            http_client,
            send_message_url: format!(
                "{}/bot{}/sendMessage",
                base_url.trim_end_matches('/'),
                bot_token
            ),
            chat_id: chat_id.to_string(),
        })
    }

    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let payload = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
        };

        let response = self
            .http_client
            .post(&self.send_message_url)
            .json(&payload)
            .send()
            .await
            // the URL carries the bot token; keep it out of the error text
            .map_err(|e| NotifyError::Request(e.without_url().to_string()))?;

        let status = response.status();
        let body: Option<SendMessageResponse> = response.json().await.ok();
        match body {
            Some(body) if status.is_success() && body.ok => Ok(()),
            Some(body) => Err(NotifyError::Rejected(
                status.as_u16(),
                body.description.unwrap_or_default(),
            )),
            None => Err(NotifyError::Rejected(status.as_u16(), String::new())),
        }
    }
}

/// Log the alerts and forward them to Telegram when credentials are set.
/// Returns whether a message was delivered; failures are only logged.
pub async fn dispatch_alerts(alerts: &[Alert], notifier: Option<&TelegramNotifier>) -> bool {
    if alerts.is_empty() {
        return false;
    }

    for alert in alerts {
        warn!("🚨 {}", alert);
    }

    let Some(notifier) = notifier else {
        return false;
    };

    let message = alerts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" | ");

    match notifier.send(&message).await {
        Ok(()) => {
            info!("Sent {} alert(s) to Telegram", alerts.len());
            true
        }
        Err(e) => {
            warn!("Failed to send alerts to Telegram: {}", e);
            false
        }
    }
}

/// Notifier built from the configured credentials, if any
pub fn notifier_from_settings(settings: &Settings) -> Option<TelegramNotifier> {
    let (token, chat_id) = settings.telegram.credentials()?;
    match TelegramNotifier::new(token, chat_id) {
        Ok(notifier) => Some(notifier),
        Err(e) => {
            warn!("Telegram notifier unavailable: {}", e);
            None
        }
    }
}
