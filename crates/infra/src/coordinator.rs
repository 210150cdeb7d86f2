//! Scan-and-replenish coordinator.
//!
//! One invocation walks the whole inventory table page by page. For every
//! depleted record it:
//!
//! 1. counts the depletion occurrence in the frequency store (idempotent per
//!    occurrence, keyed by the inventory version at which stock dropped to 0),
//! 2. claims the occurrence by conditionally resetting stock to a random
//!    quantity (the write fails if anything touched the record since the
//!    observation),
//! 3. publishes one restock event, only if it won the claim.
//!
//! Invocations are stateless and may overlap each other and the queue updater.
//! A lost claim is not an error: somebody else already ended the occurrence.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use restock_core::{InventoryKey, TenantId, Versioned};
use restock_events::{MessageId, RestockChannel, TenantScoped};
use restock_inventory::{DepletionOutcome, InventoryRecord, ReplenishmentRange, ScanCycleId, StockWrite};

use crate::retry::{RetryPolicy, with_retry};
use crate::store::{FrequencyStore, InventoryStore, StoreError};

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub range: ReplenishmentRange,
    pub page_size: usize,
    /// Stop fetching further pages once exceeded (the first page always runs).
    pub time_budget: Option<Duration>,
    /// Threads used to process the depleted records of one page.
    pub workers: usize,
    pub publish_retry: RetryPolicy,
    pub store_retry: RetryPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            range: ReplenishmentRange::default(),
            page_size: 100,
            time_budget: None,
            workers: 1,
            publish_retry: RetryPolicy::default(),
            store_retry: RetryPolicy::default(),
        }
    }
}

/// Which records a scan may touch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanScope {
    #[default]
    All,
    Tenant(TenantId),
}

impl ScanScope {
    pub fn allows(&self, tenant_id: &TenantId) -> bool {
        match self {
            ScanScope::All => true,
            ScanScope::Tenant(t) => t == tenant_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    /// The store could not be enumerated at all.
    #[error("failed to enumerate inventory: {source}")]
    Enumeration {
        source: StoreError,
        report: Box<ScanReport>,
    },
}

impl ScanError {
    /// Summary of the failed invocation (status `failure`, nothing replenished).
    pub fn report(&self) -> &ScanReport {
        match self {
            ScanError::Enumeration { report, .. } => report,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Success,
    Partial,
    Failure,
}

/// Step at which a depleted record failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    Frequency,
    Reset,
    Publish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub key: InventoryKey,
    pub stage: ScanStage,
    pub error: String,
}

/// What happened to one depleted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Replenished {
        key: InventoryKey,
        stock: u32,
        depletion: DepletionOutcome,
        message_id: MessageId,
    },
    /// Another writer ended the occurrence first.
    Skipped {
        key: InventoryKey,
        depletion: DepletionOutcome,
    },
    Failed(RecordFailure),
}

/// Summary of one coordinator invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub cycle_id: ScanCycleId,
    pub status: ScanStatus,
    pub replenished_count: usize,
    pub scanned: usize,
    pub depleted: usize,
    pub skipped: usize,
    /// Depletions that moved the frequency counter.
    pub counted: usize,
    pub pages: usize,
    /// The time budget ran out before the table was exhausted.
    pub truncated: bool,
    /// A page after the first could not be read.
    pub enumeration_error: Option<String>,
    pub failures: Vec<RecordFailure>,
    pub elapsed_ms: u64,
}

impl ScanReport {
    fn new(cycle_id: ScanCycleId) -> Self {
        Self {
            cycle_id,
            status: ScanStatus::Success,
            replenished_count: 0,
            scanned: 0,
            depleted: 0,
            skipped: 0,
            counted: 0,
            pages: 0,
            truncated: false,
            enumeration_error: None,
            failures: Vec::new(),
            elapsed_ms: 0,
        }
    }

    fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Replenished { depletion, .. } => {
                self.replenished_count += 1;
                if depletion.is_counted() {
                    self.counted += 1;
                }
            }
            RecordOutcome::Skipped { depletion, .. } => {
                self.skipped += 1;
                if depletion.is_counted() {
                    self.counted += 1;
                }
            }
            RecordOutcome::Failed(f) => self.failures.push(f),
        }
    }

    fn failed(cycle_id: ScanCycleId, error: &StoreError, elapsed: Duration) -> Self {
        Self {
            status: ScanStatus::Failure,
            enumeration_error: Some(error.to_string()),
            elapsed_ms: elapsed.as_millis() as u64,
            ..Self::new(cycle_id)
        }
    }

    fn finish(&mut self, elapsed: Duration) {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self.status = if self.truncated || self.enumeration_error.is_some() || !self.failures.is_empty() {
            ScanStatus::Partial
        } else {
            ScanStatus::Success
        };
    }
}

/// The scan-and-replenish coordinator.
pub struct ScanCoordinator<I, F, C> {
    inventory: I,
    frequency: F,
    channel: C,
    config: ScanConfig,
    rng: Mutex<StdRng>,
}

impl<I, F, C> ScanCoordinator<I, F, C>
where
    I: InventoryStore,
    F: FrequencyStore,
    C: RestockChannel,
{
    pub fn new(inventory: I, frequency: F, channel: C, config: ScanConfig) -> Self {
        Self {
            inventory,
            frequency,
            channel,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a deterministic random source for replenishment quantities.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run one scan over `scope`.
    pub fn scan(&self, scope: &ScanScope) -> Result<ScanReport, ScanError> {
        let started = Instant::now();
        let cycle_id = ScanCycleId::new();
        let mut report = ScanReport::new(cycle_id);
        let mut after: Option<InventoryKey> = None;

        info!(cycle_id = %cycle_id, scope = ?scope, "inventory scan started");

        loop {
            if report.pages > 0 {
                if let Some(budget) = self.config.time_budget {
                    if started.elapsed() >= budget {
                        warn!(cycle_id = %cycle_id, pages = report.pages, "scan time budget exhausted");
                        report.truncated = true;
                        break;
                    }
                }
            }

            let page = with_retry(&self.config.store_retry, "inventory.scan_page", StoreError::is_transient, || {
                self.inventory.scan_page(after.as_ref(), self.config.page_size)
            });

            let page = match page {
                Ok(p) => p,
                Err(e) if report.pages == 0 => {
                    error!(cycle_id = %cycle_id, error = %e, "failed to enumerate inventory");
                    let report = ScanReport::failed(cycle_id, &e, started.elapsed());
                    return Err(ScanError::Enumeration {
                        source: e,
                        report: Box::new(report),
                    });
                }
                Err(e) => {
                    warn!(cycle_id = %cycle_id, pages = report.pages, error = %e, "inventory page fetch failed; returning partial scan");
                    report.enumeration_error = Some(e.to_string());
                    break;
                }
            };

            report.pages += 1;

            let in_scope: Vec<InventoryRecord> = page
                .items
                .into_iter()
                .filter(|r| scope.allows(r.tenant_id()))
                .collect();
            report.scanned += in_scope.len();

            let depleted: Vec<InventoryRecord> = in_scope.into_iter().filter(InventoryRecord::is_depleted).collect();
            report.depleted += depleted.len();

            for outcome in self.process_depleted(cycle_id, &depleted) {
                report.record(outcome);
            }

            match page.next {
                Some(k) => after = Some(k),
                None => break,
            }
        }

        report.finish(started.elapsed());
        info!(
            cycle_id = %cycle_id,
            status = ?report.status,
            replenished = report.replenished_count,
            depleted = report.depleted,
            skipped = report.skipped,
            failures = report.failures.len(),
            "inventory scan finished"
        );
        Ok(report)
    }

    fn process_depleted(&self, cycle_id: ScanCycleId, depleted: &[InventoryRecord]) -> Vec<RecordOutcome> {
        let workers = self.config.workers.max(1);
        if workers == 1 || depleted.len() <= 1 {
            return depleted.iter().map(|r| self.replenish_one(cycle_id, r)).collect();
        }

        // Keys within a page are disjoint, so chunks never contend on a record.
        let chunk_size = depleted.len().div_ceil(workers);
        thread::scope(|s| {
            let handles: Vec<_> = depleted
                .chunks(chunk_size)
                .map(|chunk| {
                    s.spawn(move || {
                        chunk
                            .iter()
                            .map(|r| self.replenish_one(cycle_id, r))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }

    fn replenish_one(&self, cycle_id: ScanCycleId, record: &InventoryRecord) -> RecordOutcome {
        let key = record.key().clone();
        let failed = |stage: ScanStage, error: String| {
            RecordOutcome::Failed(RecordFailure {
                key: key.clone(),
                stage,
                error,
            })
        };

        let mark = match record.depletion_mark(cycle_id, Utc::now()) {
            Ok(m) => m,
            Err(e) => return failed(ScanStage::Frequency, e.to_string()),
        };

        // (a) Count the occurrence. Safe to repeat: the mark dedupes.
        let depletion = match with_retry(&self.config.store_retry, "frequency.record_depletion", StoreError::is_transient, || {
            self.frequency.record_depletion(&key, mark)
        }) {
            Ok(d) => d,
            Err(e) => {
                warn!(cycle_id = %cycle_id, key = %key, error = %e, "failed to record depletion");
                return failed(ScanStage::Frequency, e.to_string());
            }
        };

        // (b) Claim the occurrence by resetting stock against the observed version.
        let stock = self.sample_stock();
        let write = StockWrite::Replenish {
            observed_version: record.version(),
            stock,
        };
        match with_retry(&self.config.store_retry, "inventory.write_stock", StoreError::is_transient, || {
            self.inventory.write_stock(&key, write)
        }) {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                debug!(cycle_id = %cycle_id, key = %key, "depletion already handled by another writer");
                return RecordOutcome::Skipped { key, depletion };
            }
            Err(e) => {
                warn!(cycle_id = %cycle_id, key = %key, error = %e, "failed to reset stock");
                return failed(ScanStage::Reset, e.to_string());
            }
        }

        // (c) Notify. Only the claim winner gets here.
        let event = record.restock_event();
        match with_retry(&self.config.publish_retry, "channel.publish", |_| true, || self.channel.publish(&event)) {
            Ok(message_id) => {
                debug!(
                    cycle_id = %cycle_id,
                    key = %key,
                    stock,
                    frequency = depletion.frequency(),
                    message_id = %message_id,
                    "product replenished"
                );
                RecordOutcome::Replenished {
                    key,
                    stock,
                    depletion,
                    message_id,
                }
            }
            Err(e) => {
                error!(cycle_id = %cycle_id, key = %key, error = %e, "failed to publish restock event");
                failed(ScanStage::Publish, e.to_string())
            }
        }
    }

    fn sample_stock(&self) -> u32 {
        match self.rng.lock() {
            Ok(mut rng) => self.config.range.sample(&mut *rng),
            // A poisoned rng is still a valid rng.
            Err(poisoned) => self.config.range.sample(&mut *poisoned.into_inner()),
        }
    }
}
