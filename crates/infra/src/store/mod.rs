//! Inventory and frequency store abstractions.
//!
//! Both stores are shared mutable state between the scan coordinator and the
//! queue updater. Implementations must make every single-key operation atomic
//! (read-modify-write under a per-key lock or a conditional update); no
//! client-side locking layer sits on top.

use std::sync::Arc;

use thiserror::Error;

use restock_core::{Category, DomainError, InventoryKey};
use restock_inventory::{DepletionMark, DepletionOutcome, FrequencyRecord, InventoryRecord, StockWrite};

pub mod in_memory;

pub use in_memory::{InMemoryFrequencyStore, InMemoryInventoryStore};

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record does not exist.
    #[error("record not found: {0}")]
    NotFound(InventoryKey),

    /// A conditional write lost against a newer write to the same key.
    #[error("conflict on {key}: {reason}")]
    Conflict { key: InventoryKey, reason: String },

    /// The write was rejected by domain validation.
    #[error("invalid write on {key}: {reason}")]
    Invalid { key: InventoryKey, reason: String },

    /// Retryable backend failure (timeouts, throttling, connection loss).
    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Map a domain rejection of a write on `key`.
    pub fn from_domain(key: &InventoryKey, err: DomainError) -> Self {
        if err.is_conflict() {
            StoreError::Conflict {
                key: key.clone(),
                reason: err.to_string(),
            }
        } else {
            StoreError::Invalid {
                key: key.clone(),
                reason: err.to_string(),
            }
        }
    }
}

/// One page of a store scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Continuation token: pass as `after` to fetch the next page.
    pub next: Option<InventoryKey>,
}

/// Durable `(ProductId, TenantId) → {Category, Stock}` mapping.
pub trait InventoryStore: Send + Sync {
    /// Read up to `limit` records with keys strictly greater than `after`, in key order.
    fn scan_page(
        &self,
        after: Option<&InventoryKey>,
        limit: usize,
    ) -> Result<Page<InventoryRecord>, StoreError>;

    fn get(&self, key: &InventoryKey) -> Result<Option<InventoryRecord>, StoreError>;

    /// Insert or overwrite category and stock (document ingest path).
    fn upsert(
        &self,
        key: InventoryKey,
        category: Category,
        stock: u32,
    ) -> Result<InventoryRecord, StoreError>;

    /// Atomically apply a stock write to an existing record.
    fn write_stock(
        &self,
        key: &InventoryKey,
        write: StockWrite,
    ) -> Result<InventoryRecord, StoreError>;
}

/// Durable `(ProductId, TenantId) → Frequency` counter service.
pub trait FrequencyStore: Send + Sync {
    fn get(&self, key: &InventoryKey) -> Result<Option<FrequencyRecord>, StoreError>;

    /// Atomically count a depletion occurrence (create with 1 on first sight).
    fn record_depletion(
        &self,
        key: &InventoryKey,
        mark: DepletionMark,
    ) -> Result<DepletionOutcome, StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn scan_page(
        &self,
        after: Option<&InventoryKey>,
        limit: usize,
    ) -> Result<Page<InventoryRecord>, StoreError> {
        (**self).scan_page(after, limit)
    }

    fn get(&self, key: &InventoryKey) -> Result<Option<InventoryRecord>, StoreError> {
        (**self).get(key)
    }

    fn upsert(
        &self,
        key: InventoryKey,
        category: Category,
        stock: u32,
    ) -> Result<InventoryRecord, StoreError> {
        (**self).upsert(key, category, stock)
    }

    fn write_stock(
        &self,
        key: &InventoryKey,
        write: StockWrite,
    ) -> Result<InventoryRecord, StoreError> {
        (**self).write_stock(key, write)
    }
}

impl<S> FrequencyStore for Arc<S>
where
    S: FrequencyStore + ?Sized,
{
    fn get(&self, key: &InventoryKey) -> Result<Option<FrequencyRecord>, StoreError> {
        (**self).get(key)
    }

    fn record_depletion(
        &self,
        key: &InventoryKey,
        mark: DepletionMark,
    ) -> Result<DepletionOutcome, StoreError> {
        (**self).record_depletion(key, mark)
    }
}
