use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    error::{Error, Result},
    item_ref::ItemRef,
    news::NewsItem,
};

const ITEMS: TableDefinition<u64, &[u8]> = TableDefinition::new("items");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Turns a durable reference back into the current item.
pub trait ReferenceResolver: Send + Sync {
    /// Resolve the current snapshot, or [`Error::NotFound`] if the item no
    /// longer exists.
    fn resolve(&self, item_ref: ItemRef) -> Result<NewsItem>;

    fn exists(&self, item_ref: ItemRef) -> bool {
        self.resolve(item_ref).is_ok()
    }
}

/// redb-backed store of news items and persisted settings.
pub struct NewsStore {
    db: Database,
}

impl NewsStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(ITEMS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Items --

    pub fn put_item(&self, item: &NewsItem) -> Result<()> {
        let bytes = serde_json::to_vec(item)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ITEMS)?;
            table.insert(item.item_ref.raw(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Store multiple pre-serialized items in a single transaction.
    pub fn batch_put_encoded(
        &self,
        entries: &[(ItemRef, Vec<u8>)],
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ITEMS)?;
            for (item_ref, bytes) in entries {
                table.insert(item_ref.raw(), bytes.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_item(&self, item_ref: ItemRef) -> Result<Option<NewsItem>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ITEMS)?;
        match table.get(item_ref.raw())? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    pub fn remove_item(&self, item_ref: ItemRef) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(ITEMS)?;
            table.remove(item_ref.raw())?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn count_items(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ITEMS)?;
        Ok(table.len()?)
    }

    /// Find an item by the hex prefix of its reference (with or without `#`).
    pub fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ItemRef>> {
        let prefix = prefix.strip_prefix('#').unwrap_or(prefix).to_lowercase();
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ITEMS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _v) = entry?;
            let item_ref = ItemRef::from_raw(k.value());
            if item_ref.short_len(16).starts_with(&prefix) {
                result.push(item_ref);
            }
        }
        Ok(result)
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }
}

impl ReferenceResolver for NewsStore {
    fn resolve(&self, item_ref: ItemRef) -> Result<NewsItem> {
        self.get_item(item_ref)?.ok_or_else(|| Error::NotFound {
            kind: "news item",
            name: item_ref.to_string(),
        })
    }
}

impl std::fmt::Debug for NewsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsStore").finish_non_exhaustive()
    }
}
