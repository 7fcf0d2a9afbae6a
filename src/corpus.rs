use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;
use tantivy::IndexWriter;
use tracing::{debug, info, warn};

use crate::{
    data_dir::DataDir,
    error::{Error, Result},
    event_bus::{EntityKind, EventBatch, EventBus, MutationEvent},
    item_ref::ItemRef,
    news::{NewsItem, NewsState},
    news_index::NewsIndex,
    news_store::{NewsStore, ReferenceResolver},
};

/// Memory budget handed to the Tantivy writer.
const WRITER_BUDGET: usize = 15_000_000;

/// The mutable news corpus: store, index and the bus that announces changes.
///
/// Every mutation is committed to the store and then the index before its
/// events are published, so a query issued in reaction to an event sees the
/// change. A failed index write still publishes what the store committed.
pub struct Corpus {
    store: Arc<NewsStore>,
    index: Arc<NewsIndex>,
    writer: Mutex<IndexWriter>,
    bus: EventBus,
}

impl Corpus {
    pub fn new(
        store: Arc<NewsStore>,
        index: Arc<NewsIndex>,
        bus: EventBus,
    ) -> Result<Self> {
        let writer = index.writer(WRITER_BUDGET)?;
        Ok(Self {
            store,
            index,
            writer: Mutex::new(writer),
            bus,
        })
    }

    /// Open the on-disk store and index under `data_dir`.
    pub fn open(data_dir: &DataDir) -> Result<Self> {
        let store = NewsStore::open(&data_dir.store_db())?;
        let index = NewsIndex::open(&data_dir.index_dir()?)?;
        Self::new(Arc::new(store), Arc::new(index), EventBus::new())
    }

    pub fn store(&self) -> &Arc<NewsStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<NewsIndex> {
        &self.index
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn writer(&self) -> MutexGuard<'_, IndexWriter> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace items. Publishes one `Updated` batch.
    pub fn add_items(&self, items: Vec<NewsItem>) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        // Encode in parallel, then write sequentially under one transaction.
        let encoded = items
            .par_iter()
            .map(|item| Ok((item.item_ref, serde_json::to_vec(item)?)))
            .collect::<Result<Vec<_>>>()?;
        self.store.batch_put_encoded(&encoded)?;

        let events = items.iter().map(MutationEvent::updated).collect();
        self.commit_and_publish(events, |index, writer| {
            for item in &items {
                index.add_item(writer, item)?;
            }
            Ok(())
        })?;
        info!(count = items.len(), "stored news items");
        Ok(items.len())
    }

    /// Replace one item with a new version of itself.
    pub fn update_item(&self, item: NewsItem) -> Result<()> {
        self.add_items(vec![item]).map(|_| ())
    }

    /// Move items to `state`. Returns the number of items that changed.
    pub fn set_state(
        &self,
        refs: &[ItemRef],
        state: NewsState,
    ) -> Result<usize> {
        let mut changed = Vec::new();
        for &item_ref in refs {
            let mut item = self.store.resolve(item_ref)?;
            if item.state != state {
                item.state = state;
                changed.push(item);
            }
        }
        debug!(
            requested = refs.len(),
            changed = changed.len(),
            %state,
            "set state"
        );
        self.add_items(changed)
    }

    /// Delete items outright. Unknown references are ignored by the store
    /// but still purged from the index.
    pub fn delete(&self, refs: &[ItemRef]) -> Result<usize> {
        if refs.is_empty() {
            return Ok(0);
        }
        let mut removed = Vec::new();
        for &item_ref in refs {
            if self.store.remove_item(item_ref)? {
                removed.push(item_ref);
            }
        }

        let count = removed.len();
        let events = removed.into_iter().map(MutationEvent::deleted).collect();
        self.commit_and_publish(events, |index, writer| {
            for &item_ref in refs {
                index.delete_item(writer, item_ref);
            }
            Ok(())
        })?;
        if count > 0 {
            info!(count, "deleted news items");
        }
        Ok(count)
    }

    /// Write the index for a change the store has already committed, then
    /// publish `events`.
    ///
    /// The store is the record. Its events go out even when the index write
    /// fails, so live sessions drop or refresh the affected hits; the failed
    /// index operations are rolled back and the error returned. Repeating
    /// the mutation repairs the index.
    fn commit_and_publish<F>(&self, events: EventBatch, write: F) -> Result<()>
    where
        F: FnOnce(&NewsIndex, &IndexWriter) -> Result<()>,
    {
        let indexed = {
            let mut writer = self.writer();
            let written = write(&self.index, &*writer)
                .and_then(|()| writer.commit().map_err(Error::from));
            if let Err(e) = &written {
                warn!(error = %e, "index write failed, rolling back");
                if let Err(e) = writer.rollback() {
                    warn!(error = %e, "index rollback failed");
                }
            }
            written
        };

        self.bus.publish(EntityKind::News, events);
        indexed.map(|_| ())
    }

    /// Resolve a full or abbreviated reference (`#1a2b3c`) to a stored item.
    pub fn find_ref(&self, prefix: &str) -> Result<ItemRef> {
        let mut found = self.store.find_by_prefix(prefix)?;
        match found.len() {
            0 => Err(Error::NotFound {
                kind: "news item",
                name: prefix.to_string(),
            }),
            1 => Ok(found.remove(0)),
            count => Err(Error::AmbiguousRef {
                prefix: prefix.to_string(),
                count,
            }),
        }
    }
}

impl std::fmt::Debug for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Corpus")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}
