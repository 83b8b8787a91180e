//! # Key-value store backends
//!
//! Configuration and unification for the key-value store backends used to
//! persist small administrative records (tokens, granted accounts).

use std::sync::Arc;

use serde::Deserialize;

pub(crate) mod driver;
mod error;
pub(crate) mod memory;

#[doc(inline)]
pub use driver::{Driver, Item};

#[doc(inline)]
pub use error::{StoreError, StoreErrorKind};

#[doc(inline)]
pub use memory::MemoryDriver;

/// Configuration for a key-value store backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreConfig {
    /// In-memory store, pre-created with the given tables.
    Memory {
        /// Tables to create up front.
        tables: Vec<String>,
    },
}

impl StoreConfig {
    /// Build a [`Store`] from this configuration.
    #[tracing::instrument]
    pub fn build(self) -> Result<Store, StoreError> {
        let store: Store = match self {
            StoreConfig::Memory { tables } => {
                let tables: Vec<&str> = tables.iter().map(String::as_str).collect();
                MemoryDriver::with_tables(&tables).into()
            }
        };
        Ok(store)
    }
}

pub(crate) type ArcDriver = Arc<dyn Driver + Send + Sync>;

/// A cloneable handle to a key-value store backend.
#[derive(Debug, Clone)]
pub struct Store {
    driver: ArcDriver,
}

impl<D> From<D> for Store
where
    D: Driver + Send + Sync + 'static,
{
    fn from(value: D) -> Self {
        Store::new(value)
    }
}

impl Store {
    /// Create a new store from a driver.
    pub fn new<D: Driver + Send + Sync + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// The name of the underlying driver.
    pub fn name(&self) -> &str {
        self.driver.name()
    }

    /// Get a handle bound to a single table.
    pub fn table<S: Into<String>>(&self, table: S) -> StoreTable {
        StoreTable {
            driver: self.driver.clone(),
            table: table.into(),
        }
    }

    /// Write an item under the given key, overwriting any existing item.
    #[tracing::instrument(skip(self, item), fields(driver = self.driver.name()))]
    pub async fn put_item(&self, table: &str, key: &str, item: Item) -> Result<(), StoreError> {
        tracing::trace!(%key, "Putting item into: {table}/{key}");
        self.driver.put_item(table, key, item).await
    }

    /// Read the item stored under the given key, if present.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn get_item(
        &self,
        table: &str,
        key: &str,
        consistent: bool,
    ) -> Result<Option<Item>, StoreError> {
        self.driver.get_item(table, key, consistent).await
    }

    /// Delete the item stored under the given key.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn delete_item(&self, table: &str, key: &str) -> Result<(), StoreError> {
        tracing::trace!(%key, "Deleting item from: {table}/{key}");
        self.driver.delete_item(table, key).await
    }

    /// List every key in the table.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub async fn list_keys(&self, table: &str) -> Result<Vec<String>, StoreError> {
        self.driver.list_keys(table).await
    }
}

/// A store handle bound to a single table.
#[derive(Debug, Clone)]
pub struct StoreTable {
    /// The table this handle operates on.
    pub table: String,
    driver: ArcDriver,
}

impl StoreTable {
    /// Write an item under the given key, overwriting any existing item.
    #[tracing::instrument(skip(self, item), fields(driver = self.driver.name(), table = self.table))]
    pub async fn put_item(&self, key: &str, item: Item) -> Result<(), StoreError> {
        tracing::trace!(%key, "Putting item into: {}/{key}", self.table);
        self.driver.put_item(&self.table, key, item).await
    }

    /// Read the item stored under the given key, if present.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name(), table = self.table))]
    pub async fn get_item(&self, key: &str, consistent: bool) -> Result<Option<Item>, StoreError> {
        self.driver.get_item(&self.table, key, consistent).await
    }

    /// Delete the item stored under the given key.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name(), table = self.table))]
    pub async fn delete_item(&self, key: &str) -> Result<(), StoreError> {
        tracing::trace!(%key, "Deleting item from: {}/{key}", self.table);
        self.driver.delete_item(&self.table, key).await
    }

    /// List every key in the table.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name(), table = self.table))]
    pub async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        self.driver.list_keys(&self.table).await
    }
}
