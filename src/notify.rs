//! Engine notifications
//!
//! Every applied event, resolved conflict, and partition transition is
//! announced on a broadcast channel owned by the engine instance. Delivery is
//! fire-and-forget: observers that lag or disconnect never affect the engine.

use serde::{Deserialize, Serialize};

use crate::clock::RegionId;
use crate::event::EventKind;
use crate::resolver::ConflictResolution;

/// Notification emitted by the replication engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EngineNotification {
    /// A conflict-free event was applied at a region
    EventApplied {
        /// Region the event was delivered to
        region: RegionId,
        /// Logical record identity
        event_id: String,
        /// Kind of write
        kind: EventKind,
    },
    /// A contested group was resolved automatically and applied
    ConflictResolved {
        /// Region the resolution was applied at
        region: RegionId,
        /// The resolution, for audit
        resolution: ConflictResolution,
    },
    /// The resolver declined to decide; an operator must intervene.
    /// No state was mutated for this group.
    ManualResolutionRequired {
        /// Region the contested group was drained from
        region: RegionId,
        /// The undecided resolution
        resolution: ConflictResolution,
    },
    /// A simulated partition began
    PartitionStarted {
        /// Partitioned region
        region: RegionId,
        /// Simulated outage duration in milliseconds
        duration_ms: u64,
    },
    /// A simulated partition healed and the region is active again
    PartitionRecovered {
        /// Recovered region
        region: RegionId,
    },
}
