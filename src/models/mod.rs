use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::utils::{coerce, field_text};

/// Default browser user agent; the provider blocks obvious bot agents
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub const DEFAULT_BASE_URL: &str = "https://brsapi.ir/Api/Tsetmc/History.php";

/// A tradable instrument as stored in the `symbols` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub id: i64,
    pub ticker: String,
}

impl Symbol {
    pub fn new(id: i64, ticker: impl Into<String>) -> Self {
        Self { id, ticker: ticker.into() }
    }
}

/// Provider discriminator for the history endpoint (`type` query parameter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Price,
    Deals,
}

impl DataType {
    pub fn code(self) -> u8 {
        match self {
            DataType::Price => 0,
            DataType::Deals => 1,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Price => write!(f, "price"),
            DataType::Deals => write!(f, "deals"),
        }
    }
}

/// One trading observation from the price history feed.
///
/// Field names follow the provider payload: `tno`/`tvol`/`tval` are trade
/// count, volume and value; `py` is the previous close; `pf`/`pl`/`pc` are the
/// first, last and closing prices, each `*c`/`*p` pair being the absolute and
/// percent change.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: String,
    pub time: String,
    pub tno: Option<i64>,
    pub tvol: Option<i64>,
    pub tval: Option<i64>,
    pub pmin: Option<i64>,
    pub pmax: Option<i64>,
    pub py: Option<i64>,
    pub pf: Option<i64>,
    pub pl: Option<i64>,
    pub plc: Option<i64>,
    pub plp: Option<f64>,
    pub pc: Option<i64>,
    pub pcc: Option<i64>,
    pub pcp: Option<f64>,
}

impl PriceRecord {
    /// Build a record from a raw provider object. Returns `None` only when the
    /// date is missing; malformed numbers become `None` columns.
    pub fn from_value(raw: &Value) -> Option<Self> {
        let date = raw.get("date").and_then(Value::as_str)?.to_string();

        Some(Self {
            date,
            time: field_text(raw.get("time")).unwrap_or_default(),
            tno: coerce(raw.get("tno")),
            tvol: coerce(raw.get("tvol")),
            tval: coerce(raw.get("tval")),
            pmin: coerce(raw.get("pmin")),
            pmax: coerce(raw.get("pmax")),
            py: coerce(raw.get("py")),
            pf: coerce(raw.get("pf")),
            pl: coerce(raw.get("pl")),
            plc: coerce(raw.get("plc")),
            plp: coerce(raw.get("plp")),
            pc: coerce(raw.get("pc")),
            pcc: coerce(raw.get("pcc")),
            pcp: coerce(raw.get("pcp")),
        })
    }
}

/// Daily individual ("I") vs institutional ("N") buy/sell aggregates
#[derive(Debug, Clone, PartialEq)]
pub struct DealRecord {
    pub date: String,
    pub buy_count_i: Option<i64>,
    pub buy_count_n: Option<i64>,
    pub sell_count_i: Option<i64>,
    pub sell_count_n: Option<i64>,
    pub buy_i_volume: Option<i64>,
    pub buy_n_volume: Option<i64>,
    pub sell_i_volume: Option<i64>,
    pub sell_n_volume: Option<i64>,
    pub buy_i_value: Option<i64>,
    pub buy_n_value: Option<i64>,
    pub sell_i_value: Option<i64>,
    pub sell_n_value: Option<i64>,
}

impl DealRecord {
    pub fn from_value(raw: &Value) -> Option<Self> {
        let date = raw.get("date").and_then(Value::as_str)?.to_string();

        Some(Self {
            date,
            buy_count_i: coerce(raw.get("Buy_CountI")),
            buy_count_n: coerce(raw.get("Buy_CountN")),
            sell_count_i: coerce(raw.get("Sell_CountI")),
            sell_count_n: coerce(raw.get("Sell_CountN")),
            buy_i_volume: coerce(raw.get("Buy_I_Volume")),
            buy_n_volume: coerce(raw.get("Buy_N_Volume")),
            sell_i_volume: coerce(raw.get("Sell_I_Volume")),
            sell_n_volume: coerce(raw.get("Sell_N_Volume")),
            buy_i_value: coerce(raw.get("Buy_I_Value")),
            buy_n_value: coerce(raw.get("Buy_N_Value")),
            sell_i_value: coerce(raw.get("Sell_I_Value")),
            sell_n_value: coerce(raw.get("Sell_N_Value")),
        })
    }
}

/// Which fetched records are persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodSpec {
    /// Keep dates starting with the given string, e.g. `"1404"`
    YearPrefix(String),
    /// Keep dates in `year` whose two-digit month (characters 5..7) is listed
    YearMonths { year: String, months: BTreeSet<String> },
}

impl PeriodSpec {
    /// Build a year+month spec, normalizing months like `"6"` to `"06"`
    pub fn year_months<I, S>(year: impl Into<String>, months: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = BTreeSet::new();
        for month in months {
            let month = month.as_ref().trim();
            let value: u8 = month
                .parse()
                .map_err(|_| anyhow!("Invalid month '{}' in month filter", month))?;
            if !(1..=12).contains(&value) {
                return Err(anyhow!("Month {} out of range 1-12", value));
            }
            normalized.insert(format!("{:02}", value));
        }

        if normalized.is_empty() {
            return Err(anyhow!("Month filter must list at least one month"));
        }

        Ok(PeriodSpec::YearMonths { year: year.into(), months: normalized })
    }
}

impl std::fmt::Display for PeriodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodSpec::YearPrefix(year) => write!(f, "year {}", year),
            PeriodSpec::YearMonths { year, months } => {
                let months: Vec<&str> = months.iter().map(String::as_str).collect();
                write!(f, "year {} months {}", year, months.join(","))
            }
        }
    }
}

/// How an invocation chooses its symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// Process the whole universe every run
    Full,
    /// Process one rotating section per run
    Sectioned,
}

impl std::str::FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(RunMode::Full),
            "sectioned" | "section" => Ok(RunMode::Sectioned),
            other => Err(anyhow!("Unknown ETL_MODE '{}', expected 'full' or 'sectioned'", other)),
        }
    }
}

/// When upserted rows are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// One transaction covering both tables for a symbol
    PerSymbol,
    /// One transaction per chunk of this many rows, per table
    Chunked(usize),
}

/// Where the symbol universe comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolSource {
    /// The `symbols` table, ordered by id
    Database,
    /// Comma-separated tickers from the `SYMBOLS` variable
    List(Vec<String>),
    /// One ticker (optionally `ticker,id`) per line
    File(PathBuf),
}

/// Configuration for the ETL job, built once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub user_agent: String,
    pub curl_mode: bool,
    pub database_path: String,
    pub period: PeriodSpec,
    pub rate_limit: Duration,
    pub http_timeout: Duration,
    pub max_fetch_attempts: u32,
    pub retry_base_delay: Duration,
    pub section_size: usize,
    pub total_sections: u32,
    pub commit_policy: CommitPolicy,
    pub run_mode: RunMode,
    pub symbol_source: SymbolSource,
    pub symbol_ids_file: Option<PathBuf>,
    pub save_json: bool,
    pub raw_json_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = var("BRSAPI_API_KEY")
            .ok_or_else(|| anyhow!("BRSAPI_API_KEY environment variable required"))?;

        let year = var("YEAR_FILTER").unwrap_or_else(|| "1404".to_string());
        let period = match var("MONTH_FILTER") {
            Some(months) => PeriodSpec::year_months(year, months.split(','))?,
            None => PeriodSpec::YearPrefix(year),
        };

        let batch_commit_size: usize = parse_var(&var, "BATCH_COMMIT_SIZE", 5000)?;
        let commit_policy = match var("COMMIT_POLICY").as_deref() {
            None | Some("symbol") | Some("per_symbol") => CommitPolicy::PerSymbol,
            Some("chunked") => CommitPolicy::Chunked(batch_commit_size),
            Some(other) => {
                return Err(anyhow!("Unknown COMMIT_POLICY '{}', expected 'symbol' or 'chunked'", other))
            }
        };

        let run_mode = match var("ETL_MODE") {
            Some(mode) => mode.parse()?,
            None => RunMode::Sectioned,
        };

        let symbol_source = if let Some(list) = var("SYMBOLS") {
            SymbolSource::List(
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )
        } else if let Some(path) = var("SYMBOLS_FILE") {
            SymbolSource::File(PathBuf::from(path))
        } else {
            SymbolSource::Database
        };

        let config = Config {
            api_key,
            base_url: var("BRSAPI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            user_agent: var("ETL_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            curl_mode: parse_flag(var("BRSAPI_CURL")),
            database_path: var("DATABASE_PATH").unwrap_or_else(|| "etl.db".to_string()),
            period,
            rate_limit: Duration::from_millis(parse_var(&var, "RATE_LIMIT_MS", 400)?),
            http_timeout: Duration::from_secs(parse_var(&var, "HTTP_TIMEOUT_SECS", 20)?),
            max_fetch_attempts: parse_var(&var, "FETCH_MAX_ATTEMPTS", 5)?,
            retry_base_delay: Duration::from_millis(parse_var(&var, "RETRY_BASE_DELAY_MS", 1000)?),
            section_size: parse_var(&var, "SECTION_SIZE", 100)?,
            total_sections: parse_var(&var, "TOTAL_SECTIONS", 8)?,
            commit_policy,
            run_mode,
            symbol_source,
            symbol_ids_file: var("SYMBOL_IDS_FILE").map(PathBuf::from),
            save_json: parse_flag(var("SAVE_JSON")),
            raw_json_dir: PathBuf::from(var("RAW_JSON_DIR").unwrap_or_else(|| "data".to_string())),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.section_size == 0 {
            return Err(anyhow!("SECTION_SIZE must be greater than zero"));
        }
        if self.total_sections == 0 {
            return Err(anyhow!("TOTAL_SECTIONS must be greater than zero"));
        }
        if self.max_fetch_attempts == 0 {
            return Err(anyhow!("FETCH_MAX_ATTEMPTS must be at least 1"));
        }
        if let CommitPolicy::Chunked(0) = self.commit_policy {
            return Err(anyhow!("BATCH_COMMIT_SIZE must be greater than zero"));
        }
        Ok(())
    }
}

fn parse_var<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow!("{} has invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_flag(value: Option<String>) -> bool {
    matches!(value.as_deref().map(str::to_lowercase).as_deref(), Some("1") | Some("true") | Some("yes"))
}
