// Message type shared by every layer of the transport.
//
// A `Message` is an event name plus a JSON object payload. The relay never
// looks inside `data` — it frames messages, forwards them, and hands them to
// `poll()` untouched. Only the session layer (`partyline_session`) interprets
// the reserved event names below.
//
// Payload values are `serde_json::Value`, which is exactly the tagged-union
// shape the protocol needs: null, bool, number, string, sequence-of-value,
// or mapping-of-string-to-value. Arbitrary application payloads fit without
// the protocol crate knowing their schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved event: relay-wide participant id correction, `data: {"id": n}`.
pub const EVENT_ASSIGN_ID: &str = "assign_id";

/// Reserved event: participant list update, `data: {"players": [..]}`.
pub const EVENT_ROSTER: &str = "roster";

/// Reserved event: shared rng seed from the host, `data: {"seed": n}`.
pub const EVENT_SEED: &str = "seed";

/// One transported message: an event name and a JSON object payload.
///
/// Immutable once framed. Order is preserved per connection; no ordering
/// guarantee exists across connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub event: String,
    pub data: Map<String, Value>,
}

impl Message {
    /// Build a message from an event name and payload object.
    pub fn new(event: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Build a message with an empty payload.
    pub fn bare(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: Map::new(),
        }
    }

    /// Fetch an integer field from the payload, if present.
    pub fn int_field(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    /// Fetch an unsigned integer field from the payload, if present. Needed
    /// for values that use the full `u64` range, which `as_i64` rejects.
    pub fn uint_field(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }
}
