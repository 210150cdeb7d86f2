//! In-memory stores for tests/dev.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use restock_core::{Category, InventoryKey};
use restock_inventory::{DepletionMark, DepletionOutcome, FrequencyRecord, InventoryRecord, StockWrite};

use super::{FrequencyStore, InventoryStore, Page, StoreError};

/// In-memory inventory table.
///
/// A single `RwLock` over an ordered map gives per-key atomicity (trivially,
/// since every write is serialized) and stable key-order pagination.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    inner: RwLock<BTreeMap<InventoryKey, InventoryRecord>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records in key order.
    pub fn all(&self) -> Vec<InventoryRecord> {
        self.inner
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn scan_page(
        &self,
        after: Option<&InventoryKey>,
        limit: usize,
    ) -> Result<Page<InventoryRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let lower = match after {
            Some(k) => Bound::Excluded(k.clone()),
            None => Bound::Unbounded,
        };

        // Fetch one extra to know whether another page exists.
        let mut items: Vec<InventoryRecord> = map
            .range((lower, Bound::Unbounded))
            .take(limit.saturating_add(1))
            .map(|(_, v)| v.clone())
            .collect();

        let next = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|r| r.key().clone())
        } else {
            None
        };

        Ok(Page { items, next })
    }

    fn get(&self, key: &InventoryKey) -> Result<Option<InventoryRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn upsert(
        &self,
        key: InventoryKey,
        category: Category,
        stock: u32,
    ) -> Result<InventoryRecord, StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let now = Utc::now();

        let record = map
            .entry(key.clone())
            .and_modify(|r| r.apply_ingest(category.clone(), stock, now))
            .or_insert_with(|| {
                let mut r = InventoryRecord::new(key, category, stock, now);
                r.mark_stored(now);
                r
            });

        Ok(record.clone())
    }

    fn write_stock(
        &self,
        key: &InventoryKey,
        write: StockWrite,
    ) -> Result<InventoryRecord, StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let record = map
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        record
            .apply_write(write, Utc::now())
            .map_err(|e| StoreError::from_domain(key, e))?;

        Ok(record.clone())
    }
}

/// In-memory frequency table (per-key atomic counter).
#[derive(Debug, Default)]
pub struct InMemoryFrequencyStore {
    inner: RwLock<HashMap<InventoryKey, FrequencyRecord>>,
}

impl InMemoryFrequencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Current frequency for a key, `0` if never depleted.
    pub fn frequency(&self, key: &InventoryKey) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|m| m.get(key).map(FrequencyRecord::frequency))
            .unwrap_or(0)
    }
}

impl FrequencyStore for InMemoryFrequencyStore {
    fn get(&self, key: &InventoryKey) -> Result<Option<FrequencyRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn record_depletion(
        &self,
        key: &InventoryKey,
        mark: DepletionMark,
    ) -> Result<DepletionOutcome, StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        match map.get_mut(key) {
            Some(record) => Ok(record.record(mark)),
            None => {
                let record = FrequencyRecord::first(key.clone(), mark);
                let outcome = DepletionOutcome::Counted {
                    frequency: record.frequency(),
                };
                map.insert(key.clone(), record);
                Ok(outcome)
            }
        }
    }
}
