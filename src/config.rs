//! Engine configuration
//!
//! `EngineConfig::default()` carries a three-region topology with simulated
//! one-way latencies, a one second drain interval, and the thirty second
//! staleness threshold that marks partition recovery.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::RegionId;

/// Static description of a region known to the engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionSpec {
    /// Unique region identifier
    pub id: RegionId,
    /// Human-readable name
    pub name: String,
    /// Physical location
    pub location: String,
    /// Simulated one-way latency in milliseconds. Data only: the engine
    /// never sleeps on it.
    pub latency_ms: u64,
}

impl RegionSpec {
    /// Convenience constructor
    pub fn new(
        id: impl Into<RegionId>,
        name: impl Into<String>,
        location: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            latency_ms,
        }
    }
}

/// Configuration for the replication engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The region this engine instance runs in. Fan-out never enqueues onto
    /// this region's own queue.
    pub local_region: RegionId,
    /// Known regions, local region included
    pub regions: Vec<RegionSpec>,
    /// Period of the drain loop
    pub tick_interval: Duration,
    /// Events older than this classify their group as partition recovery
    pub staleness_threshold: Duration,
    /// Fixed increment added to a region's conflict rate per resolved conflict
    pub conflict_rate_increment: f64,
    /// Decay factor applied after each increment (exponential smoothing)
    pub conflict_rate_decay: f64,
    /// Capacity of the notification broadcast channel
    pub notify_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_region: "us-east".to_string(),
            regions: vec![
                RegionSpec::new("us-east", "US East", "Virginia", 50),
                RegionSpec::new("eu-west", "EU West", "Ireland", 120),
                RegionSpec::new("asia-pacific", "Asia Pacific", "Tokyo", 200),
            ],
            tick_interval: Duration::from_secs(1),
            staleness_threshold: Duration::from_secs(30),
            conflict_rate_increment: 0.01,
            conflict_rate_decay: 0.9,
            notify_capacity: 256,
        }
    }
}
