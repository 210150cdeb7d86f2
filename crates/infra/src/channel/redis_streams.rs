//! Redis Streams-backed restock channel.
//!
//! - **Send**: `XADD <stream> * body <raw>`
//! - **Receive**: reclaim entries idle longer than the visibility timeout
//!   (`XPENDING` + `XCLAIM`), then read new entries (`XREADGROUP ... >`)
//! - **Ack**: `XACK`
//! - **Dead letters**: entries delivered `max_receives` times are copied to
//!   `<stream>:dlq` and acked instead of being handed out again
//!
//! The receipt is the stream entry id; a reclaimed entry keeps its id, so a
//! late ack from the previous holder still removes it. The updater is
//! idempotent, which makes that harmless.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use restock_events::{Delivery, MessageId, Receipt, RestockChannel};

const BODY_FIELD: &str = "body";
const DEFAULT_GROUP: &str = "restock-updater";
const DEFAULT_MAX_RECEIVES: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum RedisChannelError {
    #[error("redis connection error: {0}")]
    Connection(String),

    #[error("redis command error: {0}")]
    Command(String),

    #[error("malformed stream entry: {0}")]
    Deserialization(String),
}

#[derive(Debug, Clone)]
pub struct RedisStreamsChannel {
    client: Arc<redis::Client>,
    stream_key: String,
    dlq_key: String,
    group: String,
    consumer: String,
    max_receives: u32,
}

impl RedisStreamsChannel {
    /// Connect to `redis_url` and make sure the consumer group exists.
    pub fn connect(
        redis_url: impl AsRef<str>,
        stream_key: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, RedisChannelError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisChannelError::Connection(e.to_string()))?;
        let stream_key = stream_key.into();

        let channel = Self {
            client: Arc::new(client),
            dlq_key: format!("{stream_key}:dlq"),
            stream_key,
            group: DEFAULT_GROUP.to_string(),
            consumer: consumer.into(),
            max_receives: DEFAULT_MAX_RECEIVES,
        };
        channel.ensure_group()?;
        Ok(channel)
    }

    pub fn with_max_receives(mut self, max_receives: u32) -> Self {
        self.max_receives = max_receives.max(1);
        self
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    fn conn(&self) -> Result<redis::Connection, RedisChannelError> {
        self.client
            .get_connection()
            .map_err(|e| RedisChannelError::Connection(e.to_string()))
    }

    fn ensure_group(&self) -> Result<(), RedisChannelError> {
        let mut conn = self.conn()?;
        // Fails with BUSYGROUP when the group already exists.
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(RedisChannelError::Command(format!("XGROUP CREATE failed: {e}"))),
        }
    }

    /// Reclaim entries whose visibility timeout expired.
    fn reclaim_expired(
        &self,
        conn: &mut redis::Connection,
        count: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<Delivery>, RedisChannelError> {
        let min_idle_ms = visibility_timeout.as_millis() as u64;

        // [id, consumer, idle_ms, delivery_count]
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query(conn)
            .map_err(|e| RedisChannelError::Command(format!("XPENDING failed: {e}")))?;

        let mut reclaim = Vec::new();
        for (id, _, _, delivered) in pending {
            if delivered >= u64::from(self.max_receives) {
                self.dead_letter(conn, &id, delivered)?;
            } else {
                reclaim.push(id);
            }
        }

        if reclaim.is_empty() {
            return Ok(vec![]);
        }

        let claimed: redis::Value = redis::cmd("XCLAIM")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(min_idle_ms)
            .arg(&reclaim[..])
            .query(conn)
            .map_err(|e| RedisChannelError::Command(format!("XCLAIM failed: {e}")))?;

        let entries = match claimed {
            redis::Value::Bulk(entries) => entries,
            _ => return Ok(vec![]),
        };

        let mut deliveries = Vec::new();
        for entry in entries {
            // Entries deleted from the stream come back as nil.
            if entry == redis::Value::Nil {
                continue;
            }
            let (id, body) = parse_entry(entry)?;
            let receive_count = self.delivery_count(conn, &id)?;
            deliveries.push(delivery(id, body, receive_count));
        }
        Ok(deliveries)
    }

    fn delivery_count(&self, conn: &mut redis::Connection, id: &str) -> Result<u32, RedisChannelError> {
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(id)
            .arg(id)
            .arg(1)
            .query(conn)
            .map_err(|e| RedisChannelError::Command(format!("XPENDING failed: {e}")))?;

        Ok(pending
            .first()
            .map(|(_, _, _, count)| *count as u32)
            .unwrap_or(1))
    }

    fn dead_letter(&self, conn: &mut redis::Connection, id: &str, delivered: u64) -> Result<(), RedisChannelError> {
        let entry: redis::Value = redis::cmd("XRANGE")
            .arg(&self.stream_key)
            .arg(id)
            .arg(id)
            .query(conn)
            .map_err(|e| RedisChannelError::Command(format!("XRANGE failed: {e}")))?;

        if let redis::Value::Bulk(mut entries) = entry {
            if let Some(first) = entries.pop() {
                let (_, body) = parse_entry(first)?;
                let _: String = redis::cmd("XADD")
                    .arg(&self.dlq_key)
                    .arg("*")
                    .arg("original_id")
                    .arg(id)
                    .arg("receive_count")
                    .arg(delivered)
                    .arg(BODY_FIELD)
                    .arg(body)
                    .query(conn)
                    .map_err(|e| RedisChannelError::Command(format!("XADD to DLQ failed: {e}")))?;
            }
        }

        self.xack(conn, id)?;
        warn!(stream = %self.stream_key, message_id = %id, delivered, "restock message dead-lettered");
        Ok(())
    }

    fn read_new(&self, conn: &mut redis::Connection, count: usize) -> Result<Vec<Delivery>, RedisChannelError> {
        let reply: redis::Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(">")
            .query(conn)
            .map_err(|e| RedisChannelError::Command(format!("XREADGROUP failed: {e}")))?;

        // [[stream_key, [entry, ...]]] or nil
        let streams = match reply {
            redis::Value::Bulk(streams) => streams,
            _ => return Ok(vec![]),
        };

        let mut deliveries = Vec::new();
        for stream in streams {
            let mut parts = match stream {
                redis::Value::Bulk(parts) if parts.len() == 2 => parts,
                _ => return Err(RedisChannelError::Deserialization("invalid stream reply".to_string())),
            };
            if let redis::Value::Bulk(entries) = parts.remove(1) {
                for entry in entries {
                    let (id, body) = parse_entry(entry)?;
                    deliveries.push(delivery(id, body, 1));
                }
            }
        }
        Ok(deliveries)
    }

    fn xack(&self, conn: &mut redis::Connection, id: &str) -> Result<(), RedisChannelError> {
        let _: u64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(id)
            .query(conn)
            .map_err(|e| RedisChannelError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }
}

impl RestockChannel for RedisStreamsChannel {
    type Error = RedisChannelError;

    fn send(&self, body: String) -> Result<MessageId, Self::Error> {
        let mut conn = self.conn()?;
        let id: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query(&mut conn)
            .map_err(|e| RedisChannelError::Command(format!("XADD failed: {e}")))?;
        debug!(stream = %self.stream_key, message_id = %id, "restock message sent");
        Ok(MessageId(id))
    }

    fn receive(&self, max_messages: usize, visibility_timeout: Duration) -> Result<Vec<Delivery>, Self::Error> {
        if max_messages == 0 {
            return Ok(vec![]);
        }
        let mut conn = self.conn()?;

        let mut deliveries = self.reclaim_expired(&mut conn, max_messages, visibility_timeout)?;
        let remaining = max_messages.saturating_sub(deliveries.len());
        if remaining > 0 {
            deliveries.extend(self.read_new(&mut conn, remaining)?);
        }
        Ok(deliveries)
    }

    fn ack(&self, receipt: &Receipt) -> Result<(), Self::Error> {
        let mut conn = self.conn()?;
        self.xack(&mut conn, &receipt.0)
    }
}

fn delivery(id: String, body: String, receive_count: u32) -> Delivery {
    Delivery {
        message_id: MessageId(id.clone()),
        receipt: Receipt(id),
        body,
        receive_count,
    }
}

/// Parse `[id, [field, value, ...]]` into `(id, body)`.
fn parse_entry(entry: redis::Value) -> Result<(String, String), RedisChannelError> {
    let mut parts = match entry {
        redis::Value::Bulk(parts) if parts.len() >= 2 => parts,
        _ => return Err(RedisChannelError::Deserialization("invalid entry format".to_string())),
    };

    let fields = match parts.remove(1) {
        redis::Value::Bulk(fields) => fields,
        _ => return Err(RedisChannelError::Deserialization("invalid fields format".to_string())),
    };
    let id = match &parts[0] {
        redis::Value::Data(data) => String::from_utf8_lossy(data).to_string(),
        _ => return Err(RedisChannelError::Deserialization("invalid entry id".to_string())),
    };

    for pair in fields.chunks(2) {
        if let [redis::Value::Data(k), redis::Value::Data(v)] = pair {
            if k.as_slice() == BODY_FIELD.as_bytes() {
                return Ok((id, String::from_utf8_lossy(v).to_string()));
            }
        }
    }

    // Entries without a body still have to reach the updater so they get discarded.
    Ok((id, String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> redis::Value {
        redis::Value::Data(s.as_bytes().to_vec())
    }

    #[test]
    fn parses_stream_entry() {
        let entry = redis::Value::Bulk(vec![
            data("1700000000000-0"),
            redis::Value::Bulk(vec![data("body"), data("P1:T1:Cat:Restock needed")]),
        ]);

        let (id, body) = parse_entry(entry).unwrap();
        assert_eq!(id, "1700000000000-0");
        assert_eq!(body, "P1:T1:Cat:Restock needed");
    }

    #[test]
    fn entry_without_body_yields_empty_body() {
        let entry = redis::Value::Bulk(vec![
            data("1-0"),
            redis::Value::Bulk(vec![data("other"), data("x")]),
        ]);
        assert_eq!(parse_entry(entry).unwrap().1, "");
    }

    #[test]
    fn rejects_non_bulk_entry() {
        assert!(parse_entry(data("nope")).is_err());
    }
}
