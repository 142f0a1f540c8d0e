//! Region registry: health, conflict rates, and per-region outbound queues
//!
//! The registry owns the fixed region set plus one outbound event queue per
//! region. Queues are independently lockable append-only buffers; `drain_all`
//! swaps the buffer for an empty one, so events enqueued during a drain land
//! in the next batch, never lost and never double-processed.

use std::collections::HashMap;
use std::mem;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::clock::RegionId;
use crate::config::RegionSpec;
use crate::error::{GeorepError, Result};
use crate::event::ReplicationEvent;

/// Health state of a region
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionHealth {
    /// Region is reachable and healthy
    Active,
    /// Region is reachable but impaired; deliveries continue
    Degraded,
    /// Region is unreachable; its queue accumulates (store-and-forward)
    Partitioned,
    /// Region is down; reserved for the external health-check collaborator
    Offline,
}

impl RegionHealth {
    /// Whether the drain loop delivers to a region in this state
    pub fn accepts_delivery(&self) -> bool {
        matches!(self, RegionHealth::Active | RegionHealth::Degraded)
    }
}

/// A region as tracked by the registry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Region {
    /// Unique region identifier
    pub id: RegionId,
    /// Human-readable name
    pub name: String,
    /// Physical location
    pub location: String,
    /// Current health state
    pub health: RegionHealth,
    /// Simulated one-way latency in milliseconds
    pub latency_ms: u64,
    /// Exponentially smoothed conflict rate
    pub conflict_rate: f64,
    /// Unix millis of the last successful sync
    pub last_sync_ms: u64,
}

/// Fixed set of known regions with per-region outbound queues.
///
/// Owned and mutated only by the replication engine; health may also be set
/// by an external health-check collaborator through the engine's admin
/// surface.
pub struct RegionRegistry {
    regions: RwLock<HashMap<RegionId, Region>>,
    // Queue map is immutable after construction; each queue locks on its own.
    queues: HashMap<RegionId, Mutex<Vec<ReplicationEvent>>>,
}

impl RegionRegistry {
    /// Build a registry from region specs. All regions start `Active` with a
    /// zero conflict rate and `now_ms` as their last sync.
    pub fn new(specs: &[RegionSpec], now_ms: u64) -> Self {
        let mut regions = HashMap::new();
        let mut queues = HashMap::new();
        for spec in specs {
            regions.insert(
                spec.id.clone(),
                Region {
                    id: spec.id.clone(),
                    name: spec.name.clone(),
                    location: spec.location.clone(),
                    health: RegionHealth::Active,
                    latency_ms: spec.latency_ms,
                    conflict_rate: 0.0,
                    last_sync_ms: now_ms,
                },
            );
            queues.insert(spec.id.clone(), Mutex::new(Vec::new()));
        }
        Self {
            regions: RwLock::new(regions),
            queues,
        }
    }

    /// Whether the registry knows this region
    pub fn contains(&self, region_id: &str) -> bool {
        self.queues.contains_key(region_id)
    }

    /// Snapshot of one region
    pub fn get(&self, region_id: &str) -> Option<Region> {
        self.regions.read().get(region_id).cloned()
    }

    /// Snapshot of all regions, in stable id order
    pub fn list(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.regions.read().values().cloned().collect();
        regions.sort_by(|a, b| a.id.cmp(&b.id));
        regions
    }

    /// Health of one region
    pub fn health(&self, region_id: &str) -> Option<RegionHealth> {
        self.regions.read().get(region_id).map(|r| r.health)
    }

    /// Append an event to a region's outbound queue
    pub fn enqueue(&self, region_id: &str, event: ReplicationEvent) -> Result<()> {
        let queue = self
            .queues
            .get(region_id)
            .ok_or_else(|| GeorepError::RegionNotFound(region_id.to_string()))?;
        queue.lock().push(event);
        Ok(())
    }

    /// Atomically take every queued event for a region, leaving the queue
    /// empty. Safe against concurrent `enqueue` calls.
    pub fn drain_all(&self, region_id: &str) -> Result<Vec<ReplicationEvent>> {
        let queue = self
            .queues
            .get(region_id)
            .ok_or_else(|| GeorepError::RegionNotFound(region_id.to_string()))?;
        let mut locked = queue.lock();
        Ok(mem::take(&mut *locked))
    }

    /// Number of events currently queued for a region
    pub fn queue_len(&self, region_id: &str) -> Result<usize> {
        let queue = self
            .queues
            .get(region_id)
            .ok_or_else(|| GeorepError::RegionNotFound(region_id.to_string()))?;
        Ok(queue.lock().len())
    }

    /// Set a region's health state. The queue is untouched: a partitioned
    /// region keeps accumulating events until health returns.
    pub fn set_health(&self, region_id: &str, health: RegionHealth) -> Result<()> {
        let mut regions = self.regions.write();
        let region = regions
            .get_mut(region_id)
            .ok_or_else(|| GeorepError::RegionNotFound(region_id.to_string()))?;
        region.health = health;
        Ok(())
    }

    /// Update a region's conflict rate: `rate' = (rate + increment) * decay`
    pub fn record_conflict(&self, region_id: &str, increment: f64, decay: f64) {
        let mut regions = self.regions.write();
        if let Some(region) = regions.get_mut(region_id) {
            region.conflict_rate = (region.conflict_rate + increment) * decay;
        }
    }

    /// Refresh a region's last-successful-sync timestamp
    pub fn touch_sync(&self, region_id: &str, now_ms: u64) {
        let mut regions = self.regions.write();
        if let Some(region) = regions.get_mut(region_id) {
            region.last_sync_ms = now_ms;
        }
    }
}
