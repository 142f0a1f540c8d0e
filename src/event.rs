//! Replication events
//!
//! A `ReplicationEvent` is the unit of propagation and of conflict detection:
//! two events sharing the same `id` but different payload or origin are
//! conflicting writes to the same logical record.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{RegionId, VectorClock};

/// Kind of write carried by a replication event. Closed set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A new logical record was created
    RecordCreate,
    /// An existing logical record was updated
    RecordUpdate,
    /// A member was added to a relationship (set-valued field)
    RelationshipAdd,
    /// A member was removed from a relationship
    RelationshipRemove,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::RecordCreate => write!(f, "record-create"),
            EventKind::RecordUpdate => write!(f, "record-update"),
            EventKind::RelationshipAdd => write!(f, "relationship-add"),
            EventKind::RelationshipRemove => write!(f, "relationship-remove"),
        }
    }
}

/// A write event propagated across regions.
///
/// Constructed by callers with an empty clock; the engine stamps the clock
/// at `replicate` time, after which the event is treated as immutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationEvent {
    /// Logical record identity. Events sharing an id contend for the same
    /// record and are grouped for conflict detection.
    pub id: String,
    /// Kind of write
    pub kind: EventKind,
    /// Opaque payload; only the resolver's merge path looks inside
    pub payload: Value,
    /// Logical clock snapshot taken at stamping time
    pub clock: VectorClock,
    /// Wall-clock timestamp in Unix millis
    pub timestamp_ms: u64,
    /// Region that produced the write
    pub origin: RegionId,
    /// Regions the write should be delivered to
    pub targets: Vec<RegionId>,
}

impl ReplicationEvent {
    /// Create an event stamped with the current wall clock and an empty
    /// logical clock.
    pub fn new(
        id: impl Into<String>,
        kind: EventKind,
        payload: Value,
        origin: impl Into<RegionId>,
        targets: Vec<RegionId>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
            clock: VectorClock::new(),
            timestamp_ms: unix_millis(),
            origin: origin.into(),
            targets,
        }
    }

    /// Override the wall-clock timestamp (simulated clients, tests)
    pub fn at(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

/// Current wall clock as Unix millis
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_event_has_empty_clock() {
        let event = ReplicationEvent::new(
            "tweet-1",
            EventKind::RecordCreate,
            json!({"content": "hello"}),
            "us-east",
            vec!["eu-west".to_string()],
        );
        assert!(event.clock.is_empty());
        assert!(event.timestamp_ms > 0);
    }

    #[test]
    fn test_at_overrides_timestamp() {
        let event = ReplicationEvent::new(
            "tweet-1",
            EventKind::RecordUpdate,
            json!({}),
            "us-east",
            vec![],
        )
        .at(1000);
        assert_eq!(event.timestamp_ms, 1000);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(EventKind::RelationshipAdd.to_string(), "relationship-add");
        assert_eq!(EventKind::RecordCreate.to_string(), "record-create");
    }
}
