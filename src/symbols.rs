//! Symbol universe loading and ticker → id resolution

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::database::DatabaseManager;
use crate::models::{Symbol, SymbolSource};

/// Snapshot of ticker → `symbol_id`. The `symbols` table stays authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolIdMapping {
    ids: BTreeMap<String, i64>,
}

impl SymbolIdMapping {
    pub fn from_symbols(symbols: &[Symbol]) -> Self {
        Self {
            ids: symbols.iter().map(|s| (s.ticker.clone(), s.id)).collect(),
        }
    }

    /// `cached` entries overlaid with `store`; the store wins on conflicts
    pub fn merged(store: &SymbolIdMapping, cached: &SymbolIdMapping) -> Self {
        let mut ids = cached.ids.clone();
        ids.extend(store.ids.iter().map(|(ticker, id)| (ticker.clone(), *id)));
        Self { ids }
    }

    pub fn get(&self, ticker: &str) -> Option<i64> {
        self.ids.get(ticker).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading symbol id cache {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing symbol id cache {}", path.display()))
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// A ticker from a list source, with an id if the source carried one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedTicker {
    pub ticker: String,
    pub id: Option<i64>,
}

/// Read a symbols file: one `ticker` or `ticker,id` per line, `#` comments
pub fn read_symbols_file(path: &Path) -> Result<Vec<ListedTicker>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("opening symbols file {}", path.display()))?;

    let mut tickers = Vec::new();
    for record in reader.records() {
        let record = record?;
        let ticker = match record.get(0) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => continue,
        };
        let id = match record.get(1).filter(|raw| !raw.is_empty()) {
            Some(raw) => match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Ignoring invalid id '{}' for {} in {}", raw, ticker, path.display());
                    None
                }
            },
            None => None,
        };
        tickers.push(ListedTicker { ticker, id });
    }

    Ok(tickers)
}

/// Symbols ready for processing plus tickers with no known id
#[derive(Debug, Default)]
pub struct Universe {
    pub symbols: Vec<Symbol>,
    pub unresolved: Vec<String>,
}

/// Resolve listed tickers in order: explicit id, store mapping, cached
/// mapping, then a `SYMBOL_ID_<ticker>` variable
pub fn resolve_tickers<F>(
    listed: Vec<ListedTicker>,
    store: &SymbolIdMapping,
    cached: &SymbolIdMapping,
    lookup: F,
) -> Universe
where
    F: Fn(&str) -> Option<String>,
{
    let mut universe = Universe::default();

    for ListedTicker { ticker, id } in listed {
        let resolved = id
            .or_else(|| store.get(&ticker))
            .or_else(|| cached.get(&ticker))
            .or_else(|| {
                lookup(&format!("SYMBOL_ID_{}", ticker)).and_then(|raw| raw.trim().parse().ok())
            });

        match resolved {
            Some(id) => universe.symbols.push(Symbol { id, ticker }),
            None => universe.unresolved.push(ticker),
        }
    }

    universe
}

/// Load the universe for a full run from the configured source
pub async fn load_universe<F>(
    source: &SymbolSource,
    database: &DatabaseManager,
    ids_file: Option<&Path>,
    lookup: F,
) -> Result<Universe>
where
    F: Fn(&str) -> Option<String>,
{
    let stored = database.get_symbols_ordered().await?;
    let store_mapping = SymbolIdMapping::from_symbols(&stored);

    let cached = ids_file.map(read_cache).unwrap_or_default();
    if let Some(path) = ids_file {
        refresh_snapshot(&store_mapping, &cached, path);
    }

    let universe = match source {
        SymbolSource::Database => Universe { symbols: stored, unresolved: Vec::new() },
        SymbolSource::List(tickers) => {
            let listed = tickers
                .iter()
                .map(|t| ListedTicker { ticker: t.clone(), id: None })
                .collect();
            resolve_tickers(listed, &store_mapping, &cached, lookup)
        }
        SymbolSource::File(path) => resolve_tickers(read_symbols_file(path)?, &store_mapping, &cached, lookup),
    };

    info!(
        "📋 Loaded {} symbols ({} without an id)",
        universe.symbols.len(),
        universe.unresolved.len()
    );
    Ok(universe)
}

/// The cached mapping at `path`; missing or unreadable files give an empty one
pub fn read_cache(path: &Path) -> SymbolIdMapping {
    if !path.exists() {
        return SymbolIdMapping::default();
    }
    SymbolIdMapping::load_json(path).unwrap_or_else(|e| {
        warn!("Ignoring unreadable symbol id cache: {:#}", e);
        SymbolIdMapping::default()
    })
}

/// Rewrite the snapshot from the store, keeping ids only the cache knows
pub fn refresh_snapshot(store: &SymbolIdMapping, cached: &SymbolIdMapping, path: &Path) {
    if !store.is_empty() {
        save_snapshot(&SymbolIdMapping::merged(store, cached), path);
    }
}

/// Write a mapping snapshot; failures only warn
pub fn save_snapshot(mapping: &SymbolIdMapping, path: &Path) {
    match mapping.save_json(path) {
        Ok(()) => info!("💾 Saved {} symbol ids to {}", mapping.len(), path.display()),
        Err(e) => warn!("Failed to save symbol id snapshot to {}: {:#}", path.display(), e),
    }
}
