use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use restock_core::{
    Category, DomainError, ExpectedVersion, InventoryKey, TenantId, Versioned,
};
use restock_events::{RestockEvent, TenantScoped};

use crate::frequency::{DepletionMark, ScanCycleId};

/// Current stock of one product for one tenant.
///
/// `stock` is unsigned, so the `Stock >= 0` invariant holds by construction.
/// `version` is bumped by one on every successful write and serves as the
/// token for conditional writes. `depleted_since` is the version at which the
/// current depletion began; writes that keep stock at 0 leave it alone, so it
/// identifies the occurrence until stock is observed above 0 again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    key: InventoryKey,
    category: Category,
    stock: u32,
    version: u64,
    /// 0 while stocked.
    #[serde(default)]
    depleted_since: u64,
    updated_at: DateTime<Utc>,
}

/// A write to `Stock`, as issued by one of the two update paths.
///
/// Reconciliation rule: last write wins, ordered by the store. The only
/// conditional write is the scan's replenishment, which doubles as the claim
/// on a depletion occurrence.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StockWrite {
    /// Unconditional set (queue updater). Idempotent under redelivery.
    Set { stock: u32 },

    /// Replenish a depletion observed at `observed_version`.
    ///
    /// Fails with a conflict if any write landed on the key since the
    /// observation.
    Replenish { observed_version: u64, stock: u32 },
}

impl StockWrite {
    /// Version the record must be at for this write to apply.
    pub fn expected_version(&self) -> ExpectedVersion {
        match self {
            StockWrite::Set { .. } => ExpectedVersion::Any,
            StockWrite::Replenish { observed_version, .. } => ExpectedVersion::Exact(*observed_version),
        }
    }
}

impl InventoryRecord {
    /// A record that has not been stored yet (version 0).
    pub fn new(key: InventoryKey, category: Category, stock: u32, now: DateTime<Utc>) -> Self {
        Self {
            key,
            category,
            stock,
            version: 0,
            depleted_since: 0,
            updated_at: now,
        }
    }

    pub fn key(&self) -> &InventoryKey {
        &self.key
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_depleted(&self) -> bool {
        self.stock == 0
    }

    /// Version at which the current depletion began, if depleted and stored.
    pub fn depleted_since(&self) -> Option<u64> {
        (self.depleted_since > 0).then_some(self.depleted_since)
    }

    /// Identity of the depletion occurrence this record currently represents.
    pub fn depletion_mark(
        &self,
        cycle_id: ScanCycleId,
        observed_at: DateTime<Utc>,
    ) -> Result<DepletionMark, DomainError> {
        let depleted_since = self.depleted_since().ok_or(DomainError::NotDepleted)?;
        Ok(DepletionMark {
            depleted_since,
            cycle_id,
            observed_at,
        })
    }

    /// The notification a depleted record produces.
    pub fn restock_event(&self) -> RestockEvent {
        RestockEvent::restock_needed(&self.key, self.category.clone())
    }

    /// Overwrite category and stock with freshly ingested values (last write wins).
    pub fn apply_ingest(&mut self, category: Category, stock: u32, now: DateTime<Utc>) {
        let was_depleted = self.is_depleted();
        self.category = category;
        self.stock = stock;
        self.bump(was_depleted, now);
    }

    /// Apply a stock write under the reconciliation rule.
    ///
    /// Callers must hold the per-key lock of their store; this only decides.
    pub fn apply_write(&mut self, write: StockWrite, now: DateTime<Utc>) -> Result<(), DomainError> {
        let was_depleted = self.is_depleted();
        write.expected_version().check(self.version)?;
        match write {
            StockWrite::Set { stock } => {
                self.stock = stock;
            }
            StockWrite::Replenish { stock, .. } => {
                if stock == 0 {
                    return Err(DomainError::validation("replenishment must raise stock above 0"));
                }
                if !self.is_depleted() {
                    return Err(DomainError::AlreadyReplenished);
                }
                self.stock = stock;
            }
        }

        self.bump(was_depleted, now);
        Ok(())
    }

    /// Mark the record as persisted for the first time.
    pub fn mark_stored(&mut self, now: DateTime<Utc>) {
        if self.version == 0 {
            self.bump(false, now);
        }
    }

    fn bump(&mut self, was_depleted: bool, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
        if !self.is_depleted() {
            self.depleted_since = 0;
        } else if !was_depleted || self.depleted_since == 0 {
            self.depleted_since = self.version;
        }
    }
}

impl Versioned for InventoryRecord {
    fn version(&self) -> u64 {
        self.version
    }
}

impl TenantScoped for InventoryRecord {
    fn tenant_id(&self) -> &TenantId {
        &self.key.tenant_id
    }
}
