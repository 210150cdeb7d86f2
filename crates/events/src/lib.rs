//! Restock events and the at-least-once channel they travel on.
//!
//! The channel is a transport abstraction only: it carries raw message bodies
//! and makes no promise about ordering or duplicate suppression. Consumers
//! must be idempotent.

pub mod channel;
pub mod in_memory_channel;
pub mod restock;
pub mod tenant;

pub use channel::{Delivery, MessageId, Receipt, RestockChannel};
pub use in_memory_channel::{DeadLetter, InMemoryChannelError, InMemoryRestockQueue};
pub use restock::{MalformedMessage, OtherReason, RestockEvent, RestockReason, RESTOCK_NEEDED};
pub use tenant::TenantScoped;
