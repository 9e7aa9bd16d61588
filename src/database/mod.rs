use anyhow::Result;
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqliteConnection, SqlitePool,
};
use tracing::{debug, info};

use crate::models::{DealRecord, PriceRecord, Symbol};
use crate::scheduler::{next_section, CursorStore};

/// SQLX-based store for symbols, ETL state and the two history tables
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (creating if missing) the database and ensure the schema exists
    pub async fn new(database_path: &str) -> Result<Self> {
        let filename = database_path.strip_prefix("sqlite:").unwrap_or(database_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(SqliteConnectOptions::new().filename(filename).create_if_missing(true))
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

        let db = Self { pool };
        db.create_schema().await?;
        info!("Database initialized at {}", filename);

        Ok(db)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS symbols (
                id INTEGER PRIMARY KEY,
                ticker TEXT UNIQUE NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS etl_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_section INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS symbol_price (
                symbol_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL DEFAULT '',
                tno INTEGER,
                tvol INTEGER,
                tval INTEGER,
                pmin INTEGER,
                pmax INTEGER,
                py INTEGER,
                pf INTEGER,
                pl INTEGER,
                plc INTEGER,
                plp REAL,
                pc INTEGER,
                pcc INTEGER,
                pcp REAL,
                PRIMARY KEY (symbol_id, date, time)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS symbol_deals (
                symbol_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                Buy_CountI INTEGER,
                Buy_CountN INTEGER,
                Sell_CountI INTEGER,
                Sell_CountN INTEGER,
                Buy_I_Volume INTEGER,
                Buy_N_Volume INTEGER,
                Sell_I_Volume INTEGER,
                Sell_N_Volume INTEGER,
                Buy_I_Value INTEGER,
                Buy_N_Value INTEGER,
                Sell_I_Value INTEGER,
                Sell_N_Value INTEGER,
                PRIMARY KEY (symbol_id, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or rename a symbol with a fixed id
    pub async fn upsert_symbol(&self, symbol: &Symbol) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO symbols (id, ticker) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET ticker = excluded.ticker
            "#,
        )
        .bind(symbol.id)
        .bind(&symbol.ticker)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The full symbol universe in stable id order
    pub async fn get_symbols_ordered(&self) -> Result<Vec<Symbol>> {
        let rows = sqlx::query("SELECT id, ticker FROM symbols ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| Symbol {
                id: r.get::<i64, _>("id"),
                ticker: r.get::<String, _>("ticker"),
            })
            .collect())
    }

    /// Current cursor value, `None` before the first sectioned run
    pub async fn get_last_section(&self) -> Result<Option<u32>> {
        let value: Option<i64> = sqlx::query_scalar("SELECT last_section FROM etl_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(value.map(|v| u32::try_from(v).unwrap_or(0)))
    }

    /// Replace both tables' rows for a symbol in a single transaction
    pub async fn replace_symbol_data(
        &self,
        symbol_id: i64,
        prices: &[PriceRecord],
        deals: &[DealRecord],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in prices {
            insert_price(&mut tx, symbol_id, record).await?;
        }
        for record in deals {
            insert_deal(&mut tx, symbol_id, record).await?;
        }

        tx.commit().await?;
        debug!("Committed {} price and {} deal rows for symbol {}", prices.len(), deals.len(), symbol_id);
        Ok(())
    }

    /// Replace price rows, committing every `chunk_size` rows.
    ///
    /// A failing chunk aborts the call; chunks committed before it stay.
    pub async fn replace_prices_chunked(
        &self,
        symbol_id: i64,
        records: &[PriceRecord],
        chunk_size: usize,
    ) -> Result<usize> {
        let mut written = 0;
        for chunk in records.chunks(chunk_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for record in chunk {
                insert_price(&mut tx, symbol_id, record).await?;
            }
            tx.commit().await?;
            written += chunk.len();
        }
        Ok(written)
    }

    /// Replace deal rows, committing every `chunk_size` rows
    pub async fn replace_deals_chunked(
        &self,
        symbol_id: i64,
        records: &[DealRecord],
        chunk_size: usize,
    ) -> Result<usize> {
        let mut written = 0;
        for chunk in records.chunks(chunk_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for record in chunk {
                insert_deal(&mut tx, symbol_id, record).await?;
            }
            tx.commit().await?;
            written += chunk.len();
        }
        Ok(written)
    }

    pub async fn get_price(&self, symbol_id: i64, date: &str, time: &str) -> Result<Option<PriceRecord>> {
        let row = sqlx::query(
            r#"
            SELECT date, time, tno, tvol, tval, pmin, pmax, py, pf, pl, plc, plp, pc, pcc, pcp
            FROM symbol_price
            WHERE symbol_id = ? AND date = ? AND time = ?
            "#,
        )
        .bind(symbol_id)
        .bind(date)
        .bind(time)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PriceRecord {
            date: r.get("date"),
            time: r.get("time"),
            tno: r.get("tno"),
            tvol: r.get("tvol"),
            tval: r.get("tval"),
            pmin: r.get("pmin"),
            pmax: r.get("pmax"),
            py: r.get("py"),
            pf: r.get("pf"),
            pl: r.get("pl"),
            plc: r.get("plc"),
            plp: r.get("plp"),
            pc: r.get("pc"),
            pcc: r.get("pcc"),
            pcp: r.get("pcp"),
        }))
    }

    pub async fn get_deal(&self, symbol_id: i64, date: &str) -> Result<Option<DealRecord>> {
        let row = sqlx::query("SELECT * FROM symbol_deals WHERE symbol_id = ? AND date = ?")
            .bind(symbol_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| DealRecord {
            date: r.get("date"),
            buy_count_i: r.get("Buy_CountI"),
            buy_count_n: r.get("Buy_CountN"),
            sell_count_i: r.get("Sell_CountI"),
            sell_count_n: r.get("Sell_CountN"),
            buy_i_volume: r.get("Buy_I_Volume"),
            buy_n_volume: r.get("Buy_N_Volume"),
            sell_i_volume: r.get("Sell_I_Volume"),
            sell_n_volume: r.get("Sell_N_Volume"),
            buy_i_value: r.get("Buy_I_Value"),
            buy_n_value: r.get("Buy_N_Value"),
            sell_i_value: r.get("Sell_I_Value"),
            sell_n_value: r.get("Sell_N_Value"),
        }))
    }

    /// Row counts `(prices, deals)` for one symbol
    pub async fn count_rows(&self, symbol_id: i64) -> Result<(i64, i64)> {
        let prices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM symbol_price WHERE symbol_id = ?")
            .bind(symbol_id)
            .fetch_one(&self.pool)
            .await?;
        let deals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM symbol_deals WHERE symbol_id = ?")
            .bind(symbol_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((prices, deals))
    }

    /// Get database statistics: (symbols, price rows, deal rows)
    pub async fn get_stats(&self) -> Result<(i64, i64, i64)> {
        let symbols: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM symbols").fetch_one(&self.pool).await?;
        let prices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM symbol_price").fetch_one(&self.pool).await?;
        let deals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM symbol_deals").fetch_one(&self.pool).await?;
        Ok((symbols, prices, deals))
    }
}

#[async_trait::async_trait]
impl CursorStore for DatabaseManager {
    /// Read, advance and write `etl_state.last_section` in one transaction
    async fn advance_section(&self, total_sections: u32) -> Result<u32> {
        let mut tx = self.pool.begin().await?;

        let last: Option<i64> = sqlx::query_scalar("SELECT last_section FROM etl_state WHERE id = 1")
            .fetch_optional(&mut *tx)
            .await?;
        let last = last.and_then(|v| u32::try_from(v).ok()).unwrap_or(0);
        let next = next_section(last, total_sections);

        sqlx::query(
            r#"
            INSERT INTO etl_state (id, last_section, updated_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                last_section = excluded.last_section,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(i64::from(next))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(next)
    }
}

async fn insert_price(conn: &mut SqliteConnection, symbol_id: i64, r: &PriceRecord) -> Result<()> {
    sqlx::query(
        r#"
        REPLACE INTO symbol_price (
            symbol_id, date, time, tno, tvol, tval, pmin, pmax, py, pf, pl, plc, plp, pc, pcc, pcp
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(symbol_id)
    .bind(&r.date)
    .bind(&r.time)
    .bind(r.tno)
    .bind(r.tvol)
    .bind(r.tval)
    .bind(r.pmin)
    .bind(r.pmax)
    .bind(r.py)
    .bind(r.pf)
    .bind(r.pl)
    .bind(r.plc)
    .bind(r.plp)
    .bind(r.pc)
    .bind(r.pcc)
    .bind(r.pcp)
    .execute(conn)
    .await?;

    Ok(())
}

async fn insert_deal(conn: &mut SqliteConnection, symbol_id: i64, r: &DealRecord) -> Result<()> {
    sqlx::query(
        r#"
        REPLACE INTO symbol_deals (
            symbol_id, date,
            Buy_CountI, Buy_CountN, Sell_CountI, Sell_CountN,
            Buy_I_Volume, Buy_N_Volume, Sell_I_Volume, Sell_N_Volume,
            Buy_I_Value, Buy_N_Value, Sell_I_Value, Sell_N_Value
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(symbol_id)
    .bind(&r.date)
    .bind(r.buy_count_i)
    .bind(r.buy_count_n)
    .bind(r.sell_count_i)
    .bind(r.sell_count_n)
    .bind(r.buy_i_volume)
    .bind(r.buy_n_volume)
    .bind(r.sell_i_volume)
    .bind(r.sell_n_volume)
    .bind(r.buy_i_value)
    .bind(r.buy_n_value)
    .bind(r.sell_i_value)
    .bind(r.sell_n_value)
    .execute(conn)
    .await?;

    Ok(())
}
