//! Infrastructure layer: stores, scan coordinator, queue updater, workers, config.

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod ingest;
pub mod retry;
pub mod store;
pub mod updater;
pub mod workers;

mod integration_tests;

pub use config::{ConfigError, RestockConfig};
pub use coordinator::{
    RecordFailure, RecordOutcome, ScanConfig, ScanCoordinator, ScanError, ScanReport, ScanScope, ScanStage,
    ScanStatus,
};
pub use ingest::{IngestReport, InventoryTuple, LineError, TupleError, ingest_lines};
pub use retry::{BackoffStrategy, RetryPolicy, with_retry};
pub use store::{FrequencyStore, InMemoryFrequencyStore, InMemoryInventoryStore, InventoryStore, Page, StoreError};
pub use updater::{BatchReport, BatchStatus, MessageOutcome, QueueUpdater, RawMessage, UpdaterConfig};
