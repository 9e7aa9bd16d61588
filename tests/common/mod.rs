//! Common test utilities and helpers

pub mod database;

use std::collections::HashMap;

use symbol_etl::models::Config;

pub use database::{init_fresh_test_database, TestDatabase};

/// Configuration pointing at `base_url` with delays shrunk for tests
pub fn test_config(base_url: &str, extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("BRSAPI_API_KEY".to_string(), "test_key".to_string()),
        ("BRSAPI_BASE_URL".to_string(), base_url.to_string()),
        ("RATE_LIMIT_MS".to_string(), "0".to_string()),
        ("RETRY_BASE_DELAY_MS".to_string(), "1".to_string()),
        ("HTTP_TIMEOUT_SECS".to_string(), "1".to_string()),
    ]);
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_vars(|key| vars.get(key).cloned()).expect("valid test configuration")
}

/// Test data utilities
pub mod test_data {
    use serde_json::{json, Value};

    /// Tickers `S001..S{count}`, matching ids `1..=count`
    pub fn tickers(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("S{:03}", i)).collect()
    }

    /// A provider price object with numbers sent as strings, like the live API
    pub fn price_json(date: &str, time: &str, close: i64) -> Value {
        json!({
            "date": date,
            "time": time,
            "tno": "152",
            "tvol": "1250000",
            "tval": "12500000000",
            "pmin": (close - 20).to_string(),
            "pmax": (close + 30).to_string(),
            "py": (close - 10).to_string(),
            "pf": (close - 5).to_string(),
            "pl": close.to_string(),
            "plc": "10",
            "plp": "1.01",
            "pc": close.to_string(),
            "pcc": "10",
            "pcp": "1.01"
        })
    }

    pub fn deal_json(date: &str, buy_count_i: i64) -> Value {
        json!({
            "date": date,
            "Buy_CountI": buy_count_i.to_string(),
            "Buy_CountN": "3",
            "Sell_CountI": "210",
            "Sell_CountN": "1",
            "Buy_I_Volume": "900000",
            "Buy_N_Volume": "350000",
            "Sell_I_Volume": "1200000",
            "Sell_N_Volume": "50000",
            "Buy_I_Value": "9000000000",
            "Buy_N_Value": "3500000000",
            "Sell_I_Value": "12000000000",
            "Sell_N_Value": "500000000"
        })
    }

    /// A year of price rows straddling the 1404 boundary
    pub fn mixed_year_prices() -> Vec<Value> {
        vec![
            price_json("1403-12-27", "12:29:59", 900),
            price_json("1404-01-05", "12:29:59", 950),
            price_json("1404-06-01", "12:29:59", 1000),
            price_json("1404-06-02", "12:29:59", 1010),
        ]
    }
}

/// Logging utilities for tests
pub mod logging {
    use std::sync::Once;
    use tracing::info;

    static INIT: Once = Once::new();

    /// Initialize test logging
    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = tracing::subscriber::set_global_default(
                tracing_subscriber::fmt()
                    .with_env_filter("symbol_etl=debug,main=debug")
                    .with_test_writer()
                    .finish(),
            );
        });
    }

    /// Log test step
    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }
}
