//! In-memory restock queue for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::channel::{Delivery, MessageId, Receipt, RestockChannel};

/// Default number of deliveries before a message is dead-lettered.
const DEFAULT_MAX_RECEIVES: u32 = 5;

#[derive(Debug, Error)]
pub enum InMemoryChannelError {
    /// Internal lock poisoning.
    #[error("in-memory queue lock poisoned")]
    Poisoned,

    /// The receipt does not match an in-flight delivery (already acked or redelivered).
    #[error("unknown or stale receipt: {0}")]
    StaleReceipt(String),
}

/// A message that exhausted its deliveries without being acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub message_id: MessageId,
    pub body: String,
    pub receive_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: MessageId,
    body: String,
    receive_count: u32,
}

#[derive(Debug)]
struct InFlight {
    message: StoredMessage,
    receipt: Receipt,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<MessageId, InFlight>,
    dead_letters: Vec<DeadLetter>,
}

/// In-memory work queue with visibility timeouts.
///
/// - No IO / no async
/// - Unacknowledged messages reappear once their visibility timeout expires
/// - Messages received `max_receives` times without an ack are dead-lettered
#[derive(Debug)]
pub struct InMemoryRestockQueue {
    state: Mutex<QueueState>,
    max_receives: u32,
}

impl InMemoryRestockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_receives(mut self, max_receives: u32) -> Self {
        self.max_receives = max_receives.max(1);
        self
    }

    /// Messages waiting to be received (excludes in-flight deliveries).
    pub fn ready_len(&self) -> usize {
        self.state.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Deliveries that are hidden and awaiting an ack.
    pub fn in_flight_len(&self) -> usize {
        self.state.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    /// Bodies waiting to be received, oldest first.
    pub fn ready_bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.ready.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state
            .lock()
            .map(|s| s.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Return expired in-flight deliveries to the front of the queue.
    fn requeue_expired(&self, state: &mut QueueState, now: Instant) {
        let expired: Vec<MessageId> = state
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(flight) = state.in_flight.remove(&id) {
                let message = flight.message;
                if message.receive_count >= self.max_receives {
                    warn!(
                        message_id = %message.id,
                        receive_count = message.receive_count,
                        "restock message dead-lettered"
                    );
                    state.dead_letters.push(DeadLetter {
                        message_id: message.id,
                        body: message.body,
                        receive_count: message.receive_count,
                        dead_lettered_at: Utc::now(),
                    });
                } else {
                    state.ready.push_front(message);
                }
            }
        }
    }
}

impl Default for InMemoryRestockQueue {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            max_receives: DEFAULT_MAX_RECEIVES,
        }
    }
}

impl RestockChannel for InMemoryRestockQueue {
    type Error = InMemoryChannelError;

    fn send(&self, body: String) -> Result<MessageId, Self::Error> {
        let mut state = self.state.lock().map_err(|_| InMemoryChannelError::Poisoned)?;
        let id = MessageId::generate();
        state.ready.push_back(StoredMessage {
            id: id.clone(),
            body,
            receive_count: 0,
        });
        Ok(id)
    }

    fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<Delivery>, Self::Error> {
        let mut state = self.state.lock().map_err(|_| InMemoryChannelError::Poisoned)?;
        let now = Instant::now();
        self.requeue_expired(&mut state, now);

        let mut out = Vec::new();
        while out.len() < max_messages {
            let Some(mut message) = state.ready.pop_front() else {
                break;
            };
            message.receive_count += 1;

            let receipt = Receipt(format!("{}#{}", message.id, message.receive_count));
            out.push(Delivery {
                message_id: message.id.clone(),
                receipt: receipt.clone(),
                body: message.body.clone(),
                receive_count: message.receive_count,
            });

            state.in_flight.insert(
                message.id.clone(),
                InFlight {
                    message,
                    receipt,
                    visible_at: now + visibility_timeout,
                },
            );
        }

        Ok(out)
    }

    fn ack(&self, receipt: &Receipt) -> Result<(), Self::Error> {
        let mut state = self.state.lock().map_err(|_| InMemoryChannelError::Poisoned)?;

        let id = state
            .in_flight
            .iter()
            .find(|(_, f)| &f.receipt == receipt)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| InMemoryChannelError::StaleReceipt(receipt.0.clone()))?;

        state.in_flight.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restock::RestockEvent;

    const LONG: Duration = Duration::from_secs(60);

    #[test]
    fn received_messages_are_hidden_until_acked() {
        let q = InMemoryRestockQueue::new();
        q.send("P1:T1:Cat:Restock needed".to_string()).unwrap();

        let batch = q.receive(10, LONG).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].receive_count, 1);
        assert!(q.receive(10, LONG).unwrap().is_empty());

        q.ack(&batch[0].receipt).unwrap();
        assert_eq!(q.in_flight_len(), 0);
        assert_eq!(q.ready_len(), 0);
    }

    #[test]
    fn unacked_messages_are_redelivered_after_timeout() {
        let q = InMemoryRestockQueue::new();
        let id = q.send("body".to_string()).unwrap();

        let first = q.receive(1, Duration::ZERO).unwrap();
        let second = q.receive(1, LONG).unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].message_id, id);
        assert_eq!(second[0].receive_count, 2);

        // The first receipt went stale on redelivery.
        assert!(matches!(
            q.ack(&first[0].receipt),
            Err(InMemoryChannelError::StaleReceipt(_))
        ));
        q.ack(&second[0].receipt).unwrap();
    }

    #[test]
    fn dead_letters_after_max_receives() {
        let q = InMemoryRestockQueue::new().with_max_receives(2);
        q.send("poison".to_string()).unwrap();

        assert_eq!(q.receive(1, Duration::ZERO).unwrap().len(), 1);
        assert_eq!(q.receive(1, Duration::ZERO).unwrap().len(), 1);
        assert!(q.receive(1, Duration::ZERO).unwrap().is_empty());

        let dlq = q.dead_letters();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].body, "poison");
        assert_eq!(dlq[0].receive_count, 2);
    }

    #[test]
    fn publish_uses_wire_format() {
        let q = InMemoryRestockQueue::new();
        let ev = RestockEvent::parse("P1:T1:Cat:Restock needed").unwrap();
        q.publish(&ev).unwrap();
        assert_eq!(q.ready_bodies(), vec!["P1:T1:Cat:Restock needed".to_string()]);
    }
}
