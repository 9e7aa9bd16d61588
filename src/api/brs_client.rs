use std::time::Duration;

use anyhow::Result;
use reqwest::{header::{HeaderMap, HeaderValue, ACCEPT}, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{extract_records, ApiRateLimiter, FetchError, HistoryProvider};
use crate::models::{Config, DataType};

/// Outcome of a single HTTP attempt
enum Attempt {
    Records(Vec<Value>),
    Rejected(StatusCode),
    Transient(String),
}

/// Client for the BRS (TSETMC history) API
pub struct BrsClient {
    client: Client,
    base_url: String,
    api_key: String,
    curl_mode: bool,
    max_attempts: u32,
    retry_base_delay: Duration,
    rate_limiter: ApiRateLimiter,
}

impl BrsClient {
    /// Create a new client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));

        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            curl_mode: config.curl_mode,
            max_attempts: config.max_fetch_attempts.max(1),
            retry_base_delay: config.retry_base_delay,
            rate_limiter: ApiRateLimiter::new(config.rate_limit),
        })
    }

    /// Build the history URL; the symbol is percent-escaped
    fn history_url(&self, symbol: &str, data_type: DataType) -> Result<Url, FetchError> {
        let type_code = data_type.code().to_string();
        let mut params = vec![
            ("key", self.api_key.as_str()),
            ("type", type_code.as_str()),
            ("l18", symbol),
        ];
        if self.curl_mode {
            params.push(("curl", "1"));
        }

        Url::parse_with_params(&self.base_url, &params).map_err(|e| FetchError::InvalidRequest {
            symbol: symbol.to_string(),
            reason: e.to_string(),
        })
    }

    /// Delay before retry number `retry` (1-based): base, 2x base, 4x base...
    fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.retry_base_delay.saturating_mul(factor)
    }

    async fn attempt(&self, url: &Url) -> Attempt {
        self.rate_limiter.wait().await;

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Transient(format!("request error: {}", e)),
        };

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            return Attempt::Rejected(status);
        }
        if !status.is_success() {
            return Attempt::Transient(format!("HTTP {}", status));
        }

        match response.json::<Value>().await {
            Ok(body) => Attempt::Records(extract_records(body)),
            Err(e) => Attempt::Transient(format!("invalid response body: {}", e)),
        }
    }
}

#[async_trait::async_trait]
impl HistoryProvider for BrsClient {
    /// Fetch one symbol's history, retrying transient failures with backoff
    async fn fetch_history(&self, symbol: &str, data_type: DataType) -> Result<Vec<Value>, FetchError> {
        let url = self.history_url(symbol, data_type)?;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.backoff_delay(attempt - 1)).await;
            }

            match self.attempt(&url).await {
                Attempt::Records(records) => {
                    debug!("Retrieved {} {} records for {}", records.len(), data_type, symbol);
                    return Ok(records);
                }
                Attempt::Rejected(status) => {
                    return Err(FetchError::Rejected {
                        symbol: symbol.to_string(),
                        data_type,
                        status: status.as_u16(),
                    });
                }
                Attempt::Transient(reason) => {
                    warn!("Attempt {}/{} for {} ({}) failed: {}", attempt, self.max_attempts, symbol, data_type, reason);
                    last_error = reason;
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            symbol: symbol.to_string(),
            data_type,
            attempts: self.max_attempts,
            last_error,
        })
    }
}
