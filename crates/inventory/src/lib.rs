//! Inventory replenishment domain (pure logic).
//!
//! This crate holds the records shared by the scan coordinator and the queue
//! updater, and the reconciliation rules every store applies when either path
//! writes to them. No IO, no storage, no clocks beyond caller-supplied
//! timestamps.

pub mod frequency;
pub mod record;
pub mod replenish;

pub use frequency::{DepletionMark, DepletionOutcome, FrequencyRecord, ScanCycleId};
pub use record::{InventoryRecord, StockWrite};
pub use replenish::{DEFAULT_QUEUE_REPLENISH_VALUE, ReplenishmentRange};
