//! Typed queue messages.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A message body that knows which topic it belongs to.
///
/// Implement on a tagged union with one variant per topic so consumers can
/// match exhaustively.
pub trait Payload: Send + Sync + 'static {
    /// Topic this payload is routed on.
    fn topic(&self) -> &'static str;
}

/// A payload stamped with an id, its topic and creation time.
#[derive(Debug, Clone)]
pub struct Message<P> {
    /// Unique per message; appears in consumer failure logs.
    pub id: Uuid,
    /// Routing key.
    pub topic: &'static str,
    /// Body.
    pub payload: P,
    /// When the producer built the message.
    pub created_at: DateTime<Utc>,
}

impl<P: Payload> Message<P> {
    /// Stamp a payload on its own topic.
    pub fn new(payload: P) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: payload.topic(),
            payload,
            created_at: Utc::now(),
        }
    }
}
