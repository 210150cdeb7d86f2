//! Restock channel abstraction (mechanics only).
//!
//! The channel behaves like a work queue, not a broadcast bus: each message is
//! handed to one consumer at a time and stays invisible for a visibility
//! timeout. A message that is not acknowledged before the timeout expires is
//! delivered again.
//!
//! Guarantees:
//!
//! - **At-least-once**: a message may be delivered more than once
//! - **No ordering**: redelivered messages may overtake newer ones
//! - **No persistence contract**: durability is up to the implementation
//!
//! Consumers must be idempotent.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::restock::RestockEvent;

/// Channel-assigned message identifier (stable across redeliveries).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new time-ordered identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl core::fmt::Display for MessageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof of a specific delivery, required to acknowledge it.
///
/// A receipt is only valid for the delivery that produced it; once the message
/// is redelivered the old receipt goes stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receipt(pub String);

/// One delivery of a raw message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: MessageId,
    pub receipt: Receipt,
    pub body: String,
    /// How many times this message has been handed out, including this one.
    pub receive_count: u32,
}

/// Transport for restock events.
///
/// `send` carries raw bodies so that malformed messages produced by other
/// publishers still reach consumers (and get discarded there).
///
/// The trait requires `Send + Sync`: the scan coordinator and the consumer
/// worker share a channel across threads.
pub trait RestockChannel: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Enqueue a raw message body.
    fn send(&self, body: String) -> Result<MessageId, Self::Error>;

    /// Take up to `max_messages` visible messages, hiding them for `visibility_timeout`.
    fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<Delivery>, Self::Error>;

    /// Remove a delivered message for good.
    fn ack(&self, receipt: &Receipt) -> Result<(), Self::Error>;

    /// Publish a restock event in wire format.
    fn publish(&self, event: &RestockEvent) -> Result<MessageId, Self::Error> {
        self.send(event.encode())
    }
}

impl<C> RestockChannel for Arc<C>
where
    C: RestockChannel + ?Sized,
{
    type Error = C::Error;

    fn send(&self, body: String) -> Result<MessageId, Self::Error> {
        (**self).send(body)
    }

    fn receive(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<Delivery>, Self::Error> {
        (**self).receive(max_messages, visibility_timeout)
    }

    fn ack(&self, receipt: &Receipt) -> Result<(), Self::Error> {
        (**self).ack(receipt)
    }

    fn publish(&self, event: &RestockEvent) -> Result<MessageId, Self::Error> {
        (**self).publish(event)
    }
}
