//! Test database utilities

use anyhow::Result;
use symbol_etl::database::DatabaseManager;
use symbol_etl::models::Symbol;
use tempfile::TempDir;

/// A database in its own temp directory; dropped with the directory
pub struct TestDatabase {
    pub manager: DatabaseManager,
    pub dir: TempDir,
}

/// Initialize a completely fresh test database
pub async fn init_fresh_test_database() -> Result<TestDatabase> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("etl_test.db");
    let manager = DatabaseManager::new(&path.to_string_lossy()).await?;
    Ok(TestDatabase { manager, dir })
}

impl TestDatabase {
    /// Seed `S001..S{count}` with ids `1..=count`
    pub async fn seed_symbols(&self, count: i64) -> Result<()> {
        for id in 1..=count {
            self.manager.upsert_symbol(&Symbol::new(id, format!("S{:03}", id))).await?;
        }
        Ok(())
    }
}
