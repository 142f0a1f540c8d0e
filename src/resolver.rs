//! Conflict classification and deterministic resolution
//!
//! Given a group of events contending for one logical record, the resolver
//! classifies the conflict, selects a strategy from its strategy table, and
//! computes the resolved payload. Identical inputs always produce identical
//! resolutions; every tiebreak is total and documented.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{GeorepError, Result};
use crate::event::{unix_millis, EventKind, ReplicationEvent};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Classification of a conflicting event group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictType {
    /// No pair of events is causally ordered
    ConcurrentUpdate,
    /// At least one pair of events is causally ordered, yet both claim the
    /// same record
    CausalConflict,
    /// At least one event was stalled long enough to indicate its origin
    /// region was unreachable
    PartitionRecovery,
}

/// Strategy applied to produce the resolved payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStrategy {
    /// Keep the payload with the latest wall-clock timestamp
    LastWriterWins,
    /// Merge payloads where the kind supports it; otherwise LWW semantics
    Merge,
    /// The resolver declined to decide; the caller must surface this for
    /// operator attention and mutate no state
    ManualResolve,
}

/// Outcome of resolving one contested event group.
///
/// `resolved` is `None` exactly when the strategy is `ManualResolve`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Identity of the contested record
    pub event_id: String,
    /// How the conflict was classified
    pub conflict_type: ConflictType,
    /// Strategy that produced the payload
    pub strategy: ResolutionStrategy,
    /// The payload to apply, if the resolver decided automatically
    pub resolved: Option<Value>,
    /// Unix millis at resolution time
    pub resolved_at_ms: u64,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Stateless conflict resolver, except for its strategy table.
///
/// The table maps each [`ConflictType`] to the [`ResolutionStrategy`] used
/// for it. A type absent from the table resolves to `ManualResolve`, letting
/// an operator route any class of conflict to manual handling.
pub struct ConflictResolver {
    staleness_threshold: Duration,
    strategies: RwLock<HashMap<ConflictType, ResolutionStrategy>>,
}

impl ConflictResolver {
    /// Create a resolver with the default strategy table: concurrent updates
    /// take last-writer-wins, causal conflicts and partition recovery merge.
    pub fn new(staleness_threshold: Duration) -> Self {
        let mut strategies = HashMap::new();
        strategies.insert(ConflictType::ConcurrentUpdate, ResolutionStrategy::LastWriterWins);
        strategies.insert(ConflictType::CausalConflict, ResolutionStrategy::Merge);
        strategies.insert(ConflictType::PartitionRecovery, ResolutionStrategy::Merge);
        Self {
            staleness_threshold,
            strategies: RwLock::new(strategies),
        }
    }

    /// Override the strategy for a conflict type
    pub fn set_strategy(&self, conflict_type: ConflictType, strategy: ResolutionStrategy) {
        self.strategies.write().insert(conflict_type, strategy);
    }

    /// Remove a conflict type from the table; such conflicts will resolve to
    /// `ManualResolve`.
    pub fn clear_strategy(&self, conflict_type: ConflictType) {
        self.strategies.write().remove(&conflict_type);
    }

    /// Resolve a contested group against the current wall clock
    pub fn resolve(&self, events: &[ReplicationEvent]) -> Result<ConflictResolution> {
        self.resolve_at(events, unix_millis())
    }

    /// Resolve a contested group against an explicit "now".
    ///
    /// Calling twice with the same inputs yields identical output.
    pub fn resolve_at(&self, events: &[ReplicationEvent], now_ms: u64) -> Result<ConflictResolution> {
        if events.len() < 2 {
            return Err(GeorepError::ConflictGroupTooSmall(events.len()));
        }

        let conflict_type = self.classify(events, now_ms);
        let strategy = self
            .strategies
            .read()
            .get(&conflict_type)
            .copied()
            .unwrap_or(ResolutionStrategy::ManualResolve);

        let resolved = match strategy {
            ResolutionStrategy::LastWriterWins => {
                Some(Self::last_writer_wins(events).payload.clone())
            }
            ResolutionStrategy::Merge => Some(Self::merge(events)?),
            ResolutionStrategy::ManualResolve => None,
        };

        debug!(
            event = %events[0].id,
            ?conflict_type,
            ?strategy,
            group = events.len(),
            "conflict resolved"
        );

        Ok(ConflictResolution {
            event_id: events[0].id.clone(),
            conflict_type,
            strategy,
            resolved,
            resolved_at_ms: now_ms,
        })
    }

    // -- Classification -----------------------------------------------------

    fn classify(&self, events: &[ReplicationEvent], now_ms: u64) -> ConflictType {
        let staleness_ms = self.staleness_threshold.as_millis() as u64;
        let stale = events
            .iter()
            .any(|e| now_ms.saturating_sub(e.timestamp_ms) > staleness_ms);
        if stale {
            return ConflictType::PartitionRecovery;
        }

        let causal = events.iter().enumerate().any(|(i, a)| {
            events[i + 1..]
                .iter()
                .any(|b| a.clock.causally_related(&b.clock))
        });
        if causal {
            ConflictType::CausalConflict
        } else {
            ConflictType::ConcurrentUpdate
        }
    }

    // -- Strategies ---------------------------------------------------------

    /// Latest wall-clock timestamp wins. Ties break on the lexicographically
    /// smallest origin region id, then on the highest origin counter in the
    /// event's own clock (the later stamp from the same origin).
    fn last_writer_wins(events: &[ReplicationEvent]) -> &ReplicationEvent {
        let mut best = &events[0];
        for event in &events[1..] {
            let ordering = event
                .timestamp_ms
                .cmp(&best.timestamp_ms)
                .then_with(|| best.origin.cmp(&event.origin))
                .then_with(|| event.clock.get(&event.origin).cmp(&best.clock.get(&best.origin)));
            if ordering == Ordering::Greater {
                best = event;
            }
        }
        best
    }

    /// Kind-specific merge. Relationship-add groups union their set-valued
    /// `followers` contributions; every other kind falls back to
    /// last-writer-wins on the payload.
    fn merge(events: &[ReplicationEvent]) -> Result<Value> {
        if events[0].kind == EventKind::RelationshipAdd {
            return Self::union_followers(events);
        }
        Ok(Self::last_writer_wins(events).payload.clone())
    }

    /// Union of all `followers` arrays across the group, emitted sorted so
    /// the output is byte-deterministic.
    fn union_followers(events: &[ReplicationEvent]) -> Result<Value> {
        let mut merged: BTreeSet<String> = BTreeSet::new();
        let mut any_set = false;
        for event in events {
            if let Some(list) = event.payload.get("followers").and_then(Value::as_array) {
                any_set = true;
                for follower in list {
                    if let Some(name) = follower.as_str() {
                        merged.insert(name.to_string());
                    }
                }
            }
        }
        if !any_set {
            return Err(GeorepError::UnsupportedPayload(
                "relationship-add merge expects a 'followers' array".to_string(),
            ));
        }
        let followers: Vec<String> = merged.into_iter().collect();
        Ok(json!({ "followers": followers }))
    }
}
