use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::StoreError;

/// An item is a flat attribute map stored against a single key.
pub type Item = HashMap<String, String>;

/// A key-value driver, which provides the ability to interact with a
/// durable item store.
#[async_trait::async_trait]
pub trait Driver: fmt::Debug {
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// Write an item under the given key, overwriting any existing item.
    async fn put_item(&self, table: &str, key: &str, item: Item) -> Result<(), StoreError>;

    /// Read the item stored under the given key, if present.
    ///
    /// When `consistent` is set, the driver must return a read-your-writes
    /// view: the result reflects the most recent `put_item` or `delete_item`
    /// for the same key.
    async fn get_item(
        &self,
        table: &str,
        key: &str,
        consistent: bool,
    ) -> Result<Option<Item>, StoreError>;

    /// Delete the item stored under the given key.
    ///
    /// Deleting an absent key is not an error.
    async fn delete_item(&self, table: &str, key: &str) -> Result<(), StoreError>;

    /// List every key in the table.
    async fn list_keys(&self, table: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait::async_trait]
impl<D> Driver for Arc<D>
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.deref().name()
    }

    async fn put_item(&self, table: &str, key: &str, item: Item) -> Result<(), StoreError> {
        self.deref().put_item(table, key, item).await
    }

    async fn get_item(
        &self,
        table: &str,
        key: &str,
        consistent: bool,
    ) -> Result<Option<Item>, StoreError> {
        self.deref().get_item(table, key, consistent).await
    }

    async fn delete_item(&self, table: &str, key: &str) -> Result<(), StoreError> {
        self.deref().delete_item(table, key).await
    }

    async fn list_keys(&self, table: &str) -> Result<Vec<String>, StoreError> {
        self.deref().list_keys(table).await
    }
}

#[async_trait::async_trait]
impl<D> Driver for &D
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        (*self).name()
    }

    async fn put_item(&self, table: &str, key: &str, item: Item) -> Result<(), StoreError> {
        (*self).put_item(table, key, item).await
    }

    async fn get_item(
        &self,
        table: &str,
        key: &str,
        consistent: bool,
    ) -> Result<Option<Item>, StoreError> {
        (*self).get_item(table, key, consistent).await
    }

    async fn delete_item(&self, table: &str, key: &str) -> Result<(), StoreError> {
        (*self).delete_item(table, key).await
    }

    async fn list_keys(&self, table: &str) -> Result<Vec<String>, StoreError> {
        (*self).list_keys(table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_obj_safe!(Driver);
}
