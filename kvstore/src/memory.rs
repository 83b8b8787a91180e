use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::driver::{Driver, Item};
use crate::error::{StoreError, StoreErrorKind};

fn table_not_found(engine: &'static str, table: &str) -> StoreError {
    StoreError::builder(
        engine,
        StoreErrorKind::NotFound,
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Table not found: {table}"),
        ),
    )
    .table(table)
    .context("table not found")
    .build()
}

/// Key-value driver that stores items in memory.
///
/// Every table must be created before use; looking up an item in an unknown
/// table is a `NotFound` error, while looking up an unknown key in a known
/// table is simply absent.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    tables: RwLock<HashMap<String, HashMap<String, Item>>>,
}

impl MemoryDriver {
    /// Create a new `MemoryDriver` instance, with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new `MemoryDriver` instance, with the given tables.
    pub fn with_tables(tables: &[&str]) -> Self {
        let mut map = HashMap::new();
        for table in tables {
            map.insert(table.to_string(), HashMap::new());
        }

        Self {
            tables: RwLock::new(map),
        }
    }

    /// Create a new table in the store.
    pub async fn create_table(&self, table: String) {
        let mut tables = self.tables.write().await;
        tables.entry(table).or_default();
    }
}

#[async_trait::async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put_item(&self, table: &str, key: &str, item: Item) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let table_map = tables
            .get_mut(table)
            .ok_or_else(|| table_not_found(self.name(), table))?;
        table_map.insert(key.to_string(), item);

        Ok(())
    }

    async fn get_item(
        &self,
        table: &str,
        key: &str,
        _consistent: bool,
    ) -> Result<Option<Item>, StoreError> {
        // A single RwLock guards all tables, so every read here already
        // reflects the latest committed write.
        let tables = self.tables.read().await;
        let table_map = tables
            .get(table)
            .ok_or_else(|| table_not_found(self.name(), table))?;

        Ok(table_map.get(key).cloned())
    }

    async fn delete_item(&self, table: &str, key: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let table_map = tables
            .get_mut(table)
            .ok_or_else(|| table_not_found(self.name(), table))?;
        table_map.remove(key);

        Ok(())
    }

    async fn list_keys(&self, table: &str) -> Result<Vec<String>, StoreError> {
        tracing::trace!(%table, "list memory table keys");

        let tables = self.tables.read().await;
        let table_map = tables
            .get(table)
            .ok_or_else(|| table_not_found(self.name(), table))?;

        Ok(table_map.keys().cloned().collect())
    }
}
