use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::coingecko::{CoinGeckoClient, SimplePriceResponse};
use crate::config::Settings;
use crate::models::PriceSnapshot;
use crate::utils::errors::FetchError;

/// Upper bound on how long a rate-limited retry waits
const MAX_RETRY_WAIT_SECS: u64 = 30;
const SERVER_ERROR_RETRY_WAIT_SECS: u64 = 1;

/// Fetch the current price of every configured asset.
///
/// Either every asset gets a valid price or the whole fetch fails.
pub async fn fetch_prices(settings: &Settings) -> Result<HashMap<String, f64>, FetchError> {
    let client = CoinGeckoClient::new(
        &settings.api_url,
        settings.api_key.clone(),
        Duration::from_secs(settings.request_timeout_secs),
    )?;

    let mut retries_left = settings.retries;
    loop {
        match client.simple_price(&settings.asset_ids, &settings.currency).await {
            Ok(body) => return extract_prices(&body, &settings.asset_ids, &settings.currency),
            Err(e) if retries_left > 0 && e.is_transient() => {
                retries_left -= 1;
                let wait = retry_delay(&e);
                warn!("Price fetch failed ({}), retrying once in {} s", e, wait.as_secs());
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch prices and stamp them with the cycle timestamp
pub async fn fetch_snapshot(
    settings: &Settings,
    timestamp: DateTime<Utc>,
) -> Result<PriceSnapshot, FetchError> {
    let prices = fetch_prices(settings).await?;
    info!("Fetched {} prices in {}", prices.len(), settings.currency.to_uppercase());
    Ok(PriceSnapshot::new(timestamp, &settings.currency, prices))
}

fn retry_delay(error: &FetchError) -> Duration {
    match error {
        FetchError::RateLimited { retry_after_secs } => {
            Duration::from_secs((*retry_after_secs).min(MAX_RETRY_WAIT_SECS))
        }
        _ => Duration::from_secs(SERVER_ERROR_RETRY_WAIT_SECS),
    }
}

/// Pick the requested currency for every asset out of the API body
pub fn extract_prices(
    body: &SimplePriceResponse,
    asset_ids: &[String],
    currency: &str,
) -> Result<HashMap<String, f64>, FetchError> {
    let mut prices = HashMap::with_capacity(asset_ids.len());

    for asset_id in asset_ids {
        let price = body
            .get(asset_id)
            .and_then(|quotes| quotes.get(currency))
            .copied()
            .ok_or_else(|| FetchError::MissingAsset {
                asset_id: asset_id.clone(),
                currency: currency.to_string(),
            })?;

        if !price.is_finite() || price < 0.0 {
            return Err(FetchError::InvalidPrice {
                asset_id: asset_id.clone(),
                price,
            });
        }

        prices.insert(asset_id.clone(), price);
    }

    Ok(prices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings_for(url: &str, retries: u8) -> Settings {
        let yaml = format!(
            "asset_ids: [bitcoin, ethereum]\ncurrency: usd\ncsv_path: h.csv\nhtml_output_path: i.html\napi_url: '{}'\nretries: {}\nrequest_timeout_secs: 5",
            url, retries
        );
        Settings::from_yaml_str(&yaml).expect("test config")
    }

    fn body(json: &str) -> SimplePriceResponse {
        serde_json::from_str(json).unwrap()
    }

    fn ids() -> Vec<String> {
        vec!["bitcoin".to_string(), "ethereum".to_string()]
    }

    #[test]
    fn test_extract_prices() {
        let prices = extract_prices(
            &body(r#"{"bitcoin":{"usd":65000.0,"eur":60000.0},"ethereum":{"usd":3200.0}}"#),
            &ids(),
            "usd",
        )
        .expect("complete body");

        assert_eq!(prices.len(), 2);
        assert_eq!(prices["bitcoin"], 65000.0);
        assert_eq!(prices["ethereum"], 3200.0);
    }

    #[test]
    fn test_extract_prices_missing_asset_or_currency() {
        let err = extract_prices(&body(r#"{"bitcoin":{"usd":1.0}}"#), &ids(), "usd").unwrap_err();
        assert!(matches!(err, FetchError::MissingAsset { ref asset_id, .. } if asset_id == "ethereum"));

        let err = extract_prices(
            &body(r#"{"bitcoin":{"eur":1.0},"ethereum":{"usd":1.0}}"#),
            &ids(),
            "usd",
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::MissingAsset { ref asset_id, .. } if asset_id == "bitcoin"));
    }

    #[test]
    fn test_extract_prices_rejects_negative() {
        let err = extract_prices(
            &body(r#"{"bitcoin":{"usd":-1.0},"ethereum":{"usd":1.0}}"#),
            &ids(),
            "usd",
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::InvalidPrice { .. }));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(
            retry_delay(&FetchError::RateLimited { retry_after_secs: 600 }),
            Duration::from_secs(MAX_RETRY_WAIT_SECS)
        );
        assert_eq!(
            retry_delay(&FetchError::RateLimited { retry_after_secs: 2 }),
            Duration::from_secs(2)
        );
    }

    #[tokio::test]
    async fn test_server_error_is_retried_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let settings = settings_for(&format!("{}/simple/price", server.url()), 1);
        let err = fetch_prices(&settings).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, FetchError::ServerError(500, _)));
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(502)
            .expect(1)
            .create_async()
            .await;

        let settings = settings_for(&format!("{}/simple/price", server.url()), 0);
        assert!(fetch_prices(&settings).await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let settings = settings_for(&format!("{}/simple/price", server.url()), 1);
        assert!(matches!(fetch_prices(&settings).await, Err(FetchError::NotFound(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_snapshot_stamps_timestamp() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"bitcoin":{"usd":65000.0},"ethereum":{"usd":3200.0}}"#)
            .create_async()
            .await;

        let settings = settings_for(&format!("{}/simple/price", server.url()), 0);
        let now = Utc::now();
        let snapshot = fetch_snapshot(&settings, now).await.expect("fetch should succeed");

        assert_eq!(snapshot.timestamp, now);
        assert_eq!(snapshot.currency, "usd");
        assert_eq!(snapshot.prices.len(), 2);
    }
}
