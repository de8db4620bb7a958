use reqwest::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use std::time::Duration;
use super::models::{ErrorResponse, SimplePriceResponse};
use crate::utils::errors::FetchError;
use tracing::{debug, warn};

/// Fallback wait when a 429 carries no usable `retry-after` header
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// CoinGecko `simple/price` API client
pub struct CoinGeckoClient {
    http_client: HttpClient,
    price_url: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    /// Create a client for the given `simple/price` endpoint
    pub fn new(
        price_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::RequestError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            price_url: price_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Create default headers, with the demo API key when configured
    fn create_headers(&self) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.api_key {
            let key_value = HeaderValue::from_str(key)
                .map_err(|e| FetchError::RequestError(format!("Invalid API key header: {}", e)))?;
            headers.insert("x-cg-demo-api-key", key_value);
        }

        Ok(headers)
    }

    /// Seconds to wait according to the `retry-after` header
    fn extract_retry_after(response: &reqwest::Response) -> u64 {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
    }

    /// Parse error response based on HTTP status code
    async fn handle_error_response(
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> FetchError {
        let status_code = status.as_u16();
        let retry_after_secs = Self::extract_retry_after(&response);
        let body_text = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorResponse>(&body_text)
            .ok()
            .and_then(|e| e.message())
            .unwrap_or(body_text);

        match status_code {
            400 => FetchError::BadRequest(message),
            401 => FetchError::Unauthorized(message),
            403 => FetchError::Forbidden(message),
            404 => FetchError::NotFound(message),
            429 => {
                warn!("Rate limited by price API, retry after {} s", retry_after_secs);
                FetchError::RateLimited { retry_after_secs }
            }
            500..=599 => {
                warn!("Price API server error {}: {}", status_code, message);
                FetchError::ServerError(status_code, message)
            }
            _ => FetchError::HttpError(status_code, message),
        }
    }

    /// GET /simple/price
    ///
    /// Retrieves the current price of every id in `ids` quoted in `vs_currency`.
    ///
    /// # Returns
    /// * `Ok(SimplePriceResponse)` - id -> currency -> price, as sent by the API
    /// * `Err(FetchError)` - transport, status or decoding failure
    pub async fn simple_price(
        &self,
        ids: &[String],
        vs_currency: &str,
    ) -> Result<SimplePriceResponse, FetchError> {
        let headers = self.create_headers()?;
        let joined_ids = ids.join(",");
        debug!("GET {} ids={} vs_currencies={}", self.price_url, joined_ids, vs_currency);

        let response = self.http_client
            .get(&self.price_url)
            .headers(headers)
            .query(&[("ids", joined_ids.as_str()), ("vs_currencies", vs_currency)])
            .send()
            .await
            .map_err(|e| FetchError::RequestError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::handle_error_response(status, response).await);
        }

        response
            .json::<SimplePriceResponse>()
            .await
            .map_err(|e| FetchError::DeserializationError(format!("Failed to parse response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard, api_key: Option<&str>) -> CoinGeckoClient {
        CoinGeckoClient::new(
            &format!("{}/simple/price", server.url()),
            api_key.map(str::to_string),
            Duration::from_secs(5),
        )
        .expect("client should build")
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_simple_price_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/simple/price")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("ids".into(), "bitcoin,ethereum".into()),
                Matcher::UrlEncoded("vs_currencies".into(), "usd".into()),
            ]))
            .match_header("x-cg-demo-api-key", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"bitcoin":{"usd":65000.5},"ethereum":{"usd":3200}}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("secret"));
        let body = client
            .simple_price(&ids(&["bitcoin", "ethereum"]), "usd")
            .await
            .expect("request should succeed");

        mock.assert_async().await;
        assert_eq!(body["bitcoin"]["usd"], 65000.5);
        assert_eq!(body["ethereum"]["usd"], 3200.0);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let cases: Vec<(usize, fn(&FetchError) -> bool)> = vec![
            (400, |e| matches!(e, FetchError::BadRequest(_))),
            (401, |e| matches!(e, FetchError::Unauthorized(_))),
            (403, |e| matches!(e, FetchError::Forbidden(_))),
            (404, |e| matches!(e, FetchError::NotFound(_))),
            (503, |e| matches!(e, FetchError::ServerError(503, _))),
            (418, |e| matches!(e, FetchError::HttpError(418, _))),
        ];

        for (status, check) in cases {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/simple/price")
                .match_query(Matcher::Any)
                .with_status(status)
                .with_body(r#"{"error":"nope"}"#)
                .create_async()
                .await;

            let err = client_for(&server, None)
                .simple_price(&ids(&["bitcoin"]), "usd")
                .await
                .expect_err("non-2xx must fail");
            assert!(check(&err), "status {} mapped to {:?}", status, err);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "12")
            .with_body(r#"{"status":{"error_code":429,"error_message":"slow down"}}"#)
            .create_async()
            .await;

        let err = client_for(&server, None)
            .simple_price(&ids(&["bitcoin"]), "usd")
            .await
            .expect_err("429 must fail");
        assert!(matches!(err, FetchError::RateLimited { retry_after_secs: 12 }));
    }

    #[tokio::test]
    async fn test_error_code_is_kept_in_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"status":{"error_code":10002,"error_message":"API Key Missing"}}"#)
            .create_async()
            .await;

        let err = client_for(&server, None)
            .simple_price(&ids(&["bitcoin"]), "usd")
            .await
            .expect_err("401 must fail");
        match err {
            FetchError::Unauthorized(message) => assert_eq!(message, "[10002] API Key Missing"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_body_is_a_deserialization_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = client_for(&server, None)
            .simple_price(&ids(&["bitcoin"]), "usd")
            .await
            .expect_err("non-JSON must fail");
        assert!(matches!(err, FetchError::DeserializationError(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_request_error() {
        let client = CoinGeckoClient::new(
            "http://127.0.0.1:1/simple/price",
            None,
            Duration::from_secs(2),
        )
        .expect("client should build");

        let err = client
            .simple_price(&ids(&["bitcoin"]), "usd")
            .await
            .expect_err("connection must fail");
        assert!(matches!(err, FetchError::RequestError(_)));
    }
}
