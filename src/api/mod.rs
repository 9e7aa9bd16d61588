use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::Value;

use crate::models::DataType;

pub mod brs_client;
pub use brs_client::BrsClient;

/// Enforces a minimum spacing between outgoing API requests
pub struct ApiRateLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
}

impl ApiRateLimiter {
    /// A zero interval disables limiting
    pub fn new(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval).map(RateLimiter::direct);
        Self { limiter }
    }

    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

/// Why a history fetch did not produce records
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP 400: the provider refuses this symbol; skip it for this run
    #[error("provider rejected {symbol} ({data_type}) with HTTP {status}")]
    Rejected { symbol: String, data_type: DataType, status: u16 },

    #[error("{symbol} ({data_type}) failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        symbol: String,
        data_type: DataType,
        attempts: u32,
        last_error: String,
    },

    #[error("invalid request for {symbol}: {reason}")]
    InvalidRequest { symbol: String, reason: String },
}

impl FetchError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, FetchError::Rejected { .. })
    }
}

/// Source of raw history records for one symbol and data type
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn fetch_history(&self, symbol: &str, data_type: DataType) -> Result<Vec<Value>, FetchError>;
}

/// Pull the record list out of a decoded body.
///
/// The provider usually answers with a bare array but sometimes wraps it in
/// an object; the first array-valued member wins. Anything else is empty.
pub fn extract_records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(records) => records,
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, value)| match value {
                Value::Array(records) => Some(records),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
