//! Queue-driven stock updater.
//!
//! Every restock event sets the product's stock to one fixed value. The write
//! is unconditional, so a redelivered message is harmless.

use std::collections::BTreeMap;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use restock_core::InventoryKey;
use restock_events::{MessageId, RestockEvent};
use restock_inventory::{DEFAULT_QUEUE_REPLENISH_VALUE, StockWrite};

use crate::retry::{RetryPolicy, with_retry};
use crate::store::{InventoryStore, StoreError};

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub replenish_value: u32,
    pub store_retry: RetryPolicy,
    /// Threads used for one batch. Messages for the same key stay on one thread.
    pub workers: usize,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            replenish_value: DEFAULT_QUEUE_REPLENISH_VALUE,
            store_retry: RetryPolicy::default(),
            workers: 1,
        }
    }
}

/// A message as handed to the updater: channel id plus raw body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: MessageId,
    pub body: String,
}

impl RawMessage {
    pub fn new(id: MessageId, body: impl Into<String>) -> Self {
        Self { id, body: body.into() }
    }
}

/// What the updater did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Stock was set.
    Applied { key: InventoryKey, stock: u32 },
    /// Well-formed, but not a restock request.
    Ignored { reason: String },
    /// Malformed or addressed to an unknown product; dropped for good.
    Discarded { reason: String },
    /// The store write failed; leave the message for redelivery.
    Retry { error: String },
}

impl MessageOutcome {
    /// Whether the message should be removed from the channel.
    pub fn should_ack(&self) -> bool {
        !matches!(self, MessageOutcome::Retry { .. })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    Partial,
    Failure,
}

/// Per-batch result, grouped by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub applied: Vec<MessageId>,
    pub ignored: Vec<MessageId>,
    pub discarded: Vec<MessageId>,
    pub retry: Vec<MessageId>,
}

impl BatchReport {
    fn push(&mut self, id: MessageId, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Applied { .. } => self.applied.push(id),
            MessageOutcome::Ignored { .. } => self.ignored.push(id),
            MessageOutcome::Discarded { .. } => self.discarded.push(id),
            MessageOutcome::Retry { .. } => self.retry.push(id),
        }
    }

    pub fn total(&self) -> usize {
        self.applied.len() + self.ignored.len() + self.discarded.len() + self.retry.len()
    }

    pub fn status(&self) -> BatchStatus {
        if self.retry.is_empty() {
            BatchStatus::Success
        } else if self.retry.len() == self.total() {
            BatchStatus::Failure
        } else {
            BatchStatus::Partial
        }
    }
}

pub struct QueueUpdater<I> {
    inventory: I,
    config: UpdaterConfig,
}

impl<I: InventoryStore> QueueUpdater<I> {
    pub fn new(inventory: I, config: UpdaterConfig) -> Self {
        Self { inventory, config }
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Handle one raw message.
    pub fn handle(&self, id: &MessageId, body: &str) -> MessageOutcome {
        let event = match RestockEvent::parse(body) {
            Ok(e) => e,
            Err(e) => {
                warn!(message_id = %id, error = %e, "discarding malformed restock message");
                return MessageOutcome::Discarded { reason: e.to_string() };
            }
        };

        if !event.reason.is_restock() {
            debug!(message_id = %id, reason = %event.reason, "ignoring message with unknown reason");
            return MessageOutcome::Ignored {
                reason: event.reason.to_string(),
            };
        }

        let key = event.key();
        let stock = self.config.replenish_value;
        let write = StockWrite::Set { stock };

        match with_retry(&self.config.store_retry, "inventory.write_stock", StoreError::is_transient, || {
            self.inventory.write_stock(&key, write)
        }) {
            Ok(_) => {
                debug!(
                    message_id = %id,
                    tenant = %key.tenant_id,
                    product = %key.product_id,
                    stock,
                    "stock set from restock event"
                );
                MessageOutcome::Applied { key, stock }
            }
            Err(StoreError::NotFound(_)) => {
                warn!(message_id = %id, key = %key, "discarding restock message for unknown product");
                MessageOutcome::Discarded {
                    reason: format!("unknown product {key}"),
                }
            }
            Err(e) => {
                warn!(message_id = %id, key = %key, error = %e, "stock update failed; leaving message for redelivery");
                MessageOutcome::Retry { error: e.to_string() }
            }
        }
    }

    /// Handle a batch. Returns the report and the per-message outcomes in input order.
    pub fn handle_batch(&self, messages: &[RawMessage]) -> (BatchReport, Vec<MessageOutcome>) {
        let outcomes = if self.config.workers <= 1 || messages.len() <= 1 {
            messages.iter().map(|m| self.handle(&m.id, &m.body)).collect()
        } else {
            self.handle_parallel(messages)
        };

        let mut report = BatchReport::default();
        for (m, outcome) in messages.iter().zip(&outcomes) {
            report.push(m.id.clone(), outcome);
        }

        info!(
            applied = report.applied.len(),
            ignored = report.ignored.len(),
            discarded = report.discarded.len(),
            retry = report.retry.len(),
            "restock batch processed"
        );
        (report, outcomes)
    }

    fn handle_parallel(&self, messages: &[RawMessage]) -> Vec<MessageOutcome> {
        // Group by target key so same-key messages keep their relative order.
        // Unparseable bodies get their own lane; they never touch the store.
        let mut lanes: BTreeMap<Option<InventoryKey>, Vec<usize>> = BTreeMap::new();
        for (i, m) in messages.iter().enumerate() {
            let lane = RestockEvent::parse(&m.body).ok().map(|e| e.key());
            lanes.entry(lane).or_default().push(i);
        }

        let lanes: Vec<Vec<usize>> = lanes.into_values().collect();
        let per_worker = lanes.len().div_ceil(self.config.workers.max(1));

        let mut outcomes: Vec<Option<MessageOutcome>> = vec![None; messages.len()];
        thread::scope(|s| {
            let handles: Vec<_> = lanes
                .chunks(per_worker.max(1))
                .map(|group| {
                    s.spawn(move || {
                        group
                            .iter()
                            .flatten()
                            .map(|&i| (i, self.handle(&messages[i].id, &messages[i].body)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            for h in handles {
                let done = h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                for (i, outcome) in done {
                    outcomes[i] = Some(outcome);
                }
            }
        });

        outcomes
            .into_iter()
            .map(|o| {
                o.unwrap_or_else(|| MessageOutcome::Retry {
                    error: "message was not processed".to_string(),
                })
            })
            .collect()
    }
}
