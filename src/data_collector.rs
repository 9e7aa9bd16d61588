use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::{FetchError, HistoryProvider};
use crate::database::DatabaseManager;
use crate::models::{CommitPolicy, Config, DataType, DealRecord, PriceRecord, Symbol, SymbolSource};
use crate::scheduler::{SectionPlan, SectionScheduler};
use crate::symbols::{load_universe, read_cache, refresh_snapshot, SymbolIdMapping, Universe};
use crate::utils::{filter_records, save_raw_json};

/// What happened to one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolOutcome {
    Written { prices: usize, deals: usize },
    /// The provider answered HTTP 400; try again next cycle
    Rejected,
}

/// Totals for one invocation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total_symbols: usize,
    pub processed_symbols: usize,
    pub skipped_symbols: usize,
    pub failed_symbols: usize,
    pub price_rows: usize,
    pub deal_rows: usize,
    pub section: Option<SectionPlan>,
}

/// Drives fetch → filter → upsert for a set of symbols
pub struct DataCollector {
    provider: Arc<dyn HistoryProvider>,
    database: DatabaseManager,
    config: Config,
}

impl DataCollector {
    pub fn new(provider: Arc<dyn HistoryProvider>, database: DatabaseManager, config: Config) -> Self {
        Self { provider, database, config }
    }

    /// Process one rotating section of the `symbols` table.
    ///
    /// The cursor is advanced before the first fetch; per-symbol failures
    /// never abort the run.
    pub async fn run_sectioned(&self, scheduler: &SectionScheduler) -> Result<RunSummary> {
        let symbols = self.database.get_symbols_ordered().await?;
        info!("📊 Found {} symbols in the universe", symbols.len());

        if self.config.symbol_source != SymbolSource::Database {
            warn!("⚠️ SYMBOLS/SYMBOLS_FILE only apply to full runs; sectioned runs use the symbols table");
        }
        if let Some(path) = self.config.symbol_ids_file.as_deref() {
            refresh_snapshot(&SymbolIdMapping::from_symbols(&symbols), &read_cache(path), path);
        }

        let plan = scheduler.claim_next(symbols.len()).await?;
        let section = plan.slice(&symbols);

        let mut summary = self.process_symbols(section).await;
        summary.section = Some(plan);
        Ok(summary)
    }

    /// Process every symbol from the configured source
    pub async fn run_full(&self) -> Result<RunSummary> {
        let Universe { symbols, unresolved } = load_universe(
            &self.config.symbol_source,
            &self.database,
            self.config.symbol_ids_file.as_deref(),
            |key| std::env::var(key).ok(),
        )
        .await?;

        for ticker in &unresolved {
            error!("❌ No symbol_id for {}, skipping", ticker);
        }

        let mut summary = self.process_symbols(&symbols).await;
        summary.total_symbols += unresolved.len();
        summary.skipped_symbols += unresolved.len();
        Ok(summary)
    }

    /// Sequentially process symbols, isolating each one's failures
    pub async fn process_symbols(&self, symbols: &[Symbol]) -> RunSummary {
        let total = symbols.len();
        let mut summary = RunSummary { total_symbols: total, ..Default::default() };

        for (i, symbol) in symbols.iter().enumerate() {
            info!("🔄 {}/{} - {} (id {})", i + 1, total, symbol.ticker, symbol.id);

            match self.process_symbol(symbol).await {
                Ok(SymbolOutcome::Written { prices, deals }) => {
                    summary.processed_symbols += 1;
                    summary.price_rows += prices;
                    summary.deal_rows += deals;
                    if prices + deals > 0 {
                        info!("✅ {}: {} price rows, {} deal rows", symbol.ticker, prices, deals);
                    } else {
                        debug!("⚪ {}: nothing in period", symbol.ticker);
                    }
                }
                Ok(SymbolOutcome::Rejected) => {
                    summary.skipped_symbols += 1;
                    warn!("⏭️  {}: rejected by provider (HTTP 400), skipped", symbol.ticker);
                }
                Err(e) => {
                    summary.failed_symbols += 1;
                    error!("❌ {} failed: {:#}", symbol.ticker, e);
                }
            }
        }

        info!(
            "📊 Results: {} processed, {} skipped, {} failed, {} price rows, {} deal rows",
            summary.processed_symbols,
            summary.skipped_symbols,
            summary.failed_symbols,
            summary.price_rows,
            summary.deal_rows
        );
        summary
    }

    /// Fetch both data types for one symbol, filter to the period and upsert
    pub async fn process_symbol(&self, symbol: &Symbol) -> Result<SymbolOutcome> {
        let raw_prices = match self.fetch(symbol, DataType::Price).await? {
            Some(records) => records,
            None => return Ok(SymbolOutcome::Rejected),
        };
        let raw_deals = match self.fetch(symbol, DataType::Deals).await? {
            Some(records) => records,
            None => return Ok(SymbolOutcome::Rejected),
        };

        let prices: Vec<PriceRecord> = filter_records(raw_prices, &self.config.period)
            .iter()
            .filter_map(PriceRecord::from_value)
            .collect();
        let deals: Vec<DealRecord> = filter_records(raw_deals, &self.config.period)
            .iter()
            .filter_map(DealRecord::from_value)
            .collect();

        match self.config.commit_policy {
            CommitPolicy::PerSymbol => {
                self.database.replace_symbol_data(symbol.id, &prices, &deals).await?;
            }
            CommitPolicy::Chunked(chunk_size) => {
                self.database.replace_prices_chunked(symbol.id, &prices, chunk_size).await?;
                self.database.replace_deals_chunked(symbol.id, &deals, chunk_size).await?;
            }
        }

        Ok(SymbolOutcome::Written { prices: prices.len(), deals: deals.len() })
    }

    /// `Ok(None)` means the provider rejected the symbol
    async fn fetch(&self, symbol: &Symbol, data_type: DataType) -> Result<Option<Vec<Value>>> {
        let records = match self.provider.fetch_history(&symbol.ticker, data_type).await {
            Ok(records) => records,
            Err(FetchError::Rejected { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if self.config.save_json {
            if let Err(e) = save_raw_json(&self.config.raw_json_dir, &symbol.ticker, data_type, &records) {
                warn!("Failed to save raw {} JSON for {}: {:#}", data_type, symbol.ticker, e);
            }
        }

        Ok(Some(records))
    }
}
