//! Background workers: restock consumer and periodic scan runner.

pub mod consumer_worker;
pub mod scan_runner;

pub use consumer_worker::{ConsumerConfig, ConsumerHandle, ConsumerStats, ConsumerWorker};
pub use scan_runner::{ScanRunner, ScanRunnerHandle};
