//! Replication engine
//!
//! The orchestrator: accepts outbound events, stamps them with the origin
//! region's logical clock, fans them into per-target-region queues, and runs
//! a fixed-interval drain loop that groups queued events by logical identity
//! and routes contested groups through the conflict resolver.
//!
//! An engine instance owns its region registry, clocks, resolver, and
//! notification channel outright; there are no ambient singletons, so
//! multiple instances never cross-talk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::{RegionId, VectorClock};
use crate::config::EngineConfig;
use crate::error::{GeorepError, Result};
use crate::event::{unix_millis, EventKind, ReplicationEvent};
use crate::notify::EngineNotification;
use crate::registry::{Region, RegionHealth, RegionRegistry};
use crate::resolver::{ConflictResolver, ConflictType, ResolutionStrategy};

// ---------------------------------------------------------------------------
// Collaborator contracts
// ---------------------------------------------------------------------------

/// Callback through which resolved payloads reach the external record store.
///
/// Invoked once per applied event or resolved conflict group with the
/// payload, the event kind, and the logical record identity. A failure is
/// treated as a processing failure for that group only.
pub type ApplyCallback = Box<dyn Fn(&Value, EventKind, &str) -> Result<()> + Send + Sync>;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Atomic counters for engine statistics
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Events accepted by `replicate`
    pub events_replicated: AtomicU64,
    /// Conflict-free events applied
    pub events_applied: AtomicU64,
    /// Per-target drops for unknown regions
    pub events_dropped: AtomicU64,
    /// Contested groups encountered
    pub conflicts_detected: AtomicU64,
    /// Contested groups resolved and applied
    pub conflicts_resolved: AtomicU64,
    /// Contested groups surfaced for manual resolution
    pub manual_resolutions: AtomicU64,
    /// Drain cycles run
    pub ticks: AtomicU64,
    /// Drain cycles skipped because the previous one was still in flight
    pub ticks_skipped: AtomicU64,
}

/// A point-in-time snapshot of engine statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineStatsSnapshot {
    /// Events accepted by `replicate`
    pub events_replicated: u64,
    /// Conflict-free events applied
    pub events_applied: u64,
    /// Per-target drops for unknown regions
    pub events_dropped: u64,
    /// Contested groups encountered
    pub conflicts_detected: u64,
    /// Contested groups resolved and applied
    pub conflicts_resolved: u64,
    /// Contested groups surfaced for manual resolution
    pub manual_resolutions: u64,
    /// Drain cycles run
    pub ticks: u64,
    /// Drain cycles skipped
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Clock state
// ---------------------------------------------------------------------------

/// Per-region causal views plus the engine's aggregate clock.
///
/// Each known region gets its own clock, created empty at engine start, so
/// that writes stamped at different origins compare concurrent unless one
/// origin has actually observed the other's events. The aggregate `local`
/// clock absorbs every stamp and every applied event; an applied event's
/// clock is therefore always causally ≤ the engine's current clock.
struct ClockState {
    regions: HashMap<RegionId, VectorClock>,
    local: VectorClock,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Cross-region replication engine
pub struct ReplicationEngine {
    config: EngineConfig,
    // Shared with deferred partition-restoration tasks.
    registry: Arc<RegionRegistry>,
    clocks: RwLock<ClockState>,
    resolver: ConflictResolver,
    apply: ApplyCallback,
    notify_tx: broadcast::Sender<EngineNotification>,
    shutdown_tx: broadcast::Sender<()>,
    running: AtomicBool,
    tick_in_flight: AtomicBool,
    stats: EngineStats,
}

impl ReplicationEngine {
    /// Create an engine from a configuration and an apply callback
    pub fn new(config: EngineConfig, apply: ApplyCallback) -> Self {
        let registry = Arc::new(RegionRegistry::new(&config.regions, unix_millis()));
        let resolver = ConflictResolver::new(config.staleness_threshold);
        let (notify_tx, _) = broadcast::channel(config.notify_capacity);
        let (shutdown_tx, _) = broadcast::channel(1);

        let region_clocks = config
            .regions
            .iter()
            .map(|spec| (spec.id.clone(), VectorClock::new()))
            .collect();

        Self {
            config,
            registry,
            clocks: RwLock::new(ClockState {
                regions: region_clocks,
                local: VectorClock::new(),
            }),
            resolver,
            apply,
            notify_tx,
            shutdown_tx,
            running: AtomicBool::new(false),
            tick_in_flight: AtomicBool::new(false),
            stats: EngineStats::default(),
        }
    }

    // -- Replication --------------------------------------------------------

    /// Stamp an event with its origin region's clock and enqueue it onto
    /// every target region's queue except this engine's own.
    ///
    /// The event is durably queued in-process before this returns; no
    /// network I/O happens here. Unknown target regions are dropped for that
    /// target only. Returns the stamped, now-immutable event.
    pub fn replicate(&self, mut event: ReplicationEvent) -> Result<ReplicationEvent> {
        if event.targets.is_empty() {
            return Err(GeorepError::NoTargetRegions);
        }

        {
            let mut clocks = self.clocks.write();
            let stamped = {
                let origin = clocks.regions.entry(event.origin.clone()).or_default();
                origin.increment(&event.origin);
                origin.clone()
            };
            clocks.local.merge(&stamped);
            event.clock = stamped;
        }

        for target in &event.targets {
            if *target == self.config.local_region {
                continue;
            }
            match self.registry.enqueue(target, event.clone()) {
                Ok(()) => {}
                Err(GeorepError::RegionNotFound(_)) => {
                    // Topology bug upstream: drop for this target only.
                    self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        target = %target,
                        event = %event.id,
                        "dropping event for unknown target region"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        self.stats.events_replicated.fetch_add(1, Ordering::Relaxed);
        Ok(event)
    }

    /// Run one drain cycle over every deliverable region.
    ///
    /// Not re-entrant: if a previous tick is still in flight the call is
    /// recorded as skipped and returns immediately, so a slow cycle can
    /// never double-drain a queue. Partitioned and offline regions are left
    /// untouched; their queues keep accumulating.
    pub fn tick(&self) {
        if self.tick_in_flight.swap(true, Ordering::SeqCst) {
            self.stats.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("previous tick still in flight, skipping");
            return;
        }
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        for region in self.registry.list() {
            if !region.health.accepts_delivery() {
                continue;
            }
            self.drain_region(&region.id);
        }

        self.tick_in_flight.store(false, Ordering::SeqCst);
    }

    fn drain_region(&self, region_id: &str) {
        let drained = match self.registry.drain_all(region_id) {
            Ok(events) => events,
            Err(_) => return,
        };
        if drained.is_empty() {
            return;
        }

        // Group by logical identity, preserving first-arrival order.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<ReplicationEvent>> = HashMap::new();
        for event in drained {
            if !groups.contains_key(&event.id) {
                order.push(event.id.clone());
            }
            groups.entry(event.id.clone()).or_default().push(event);
        }

        for id in &order {
            let Some(mut group) = groups.remove(id) else {
                continue;
            };
            if group.len() == 1 {
                self.apply_single(region_id, group.remove(0));
            } else {
                self.resolve_group(region_id, group);
            }
        }

        self.registry.touch_sync(region_id, unix_millis());
    }

    fn apply_single(&self, region_id: &str, event: ReplicationEvent) {
        if let Err(err) = (self.apply)(&event.payload, event.kind, &event.id) {
            warn!(
                region = %region_id,
                event = %event.id,
                error = %err,
                "apply callback failed, event skipped and clock not merged"
            );
            return;
        }

        self.merge_applied(region_id, std::slice::from_ref(&event.clock));
        self.stats.events_applied.fetch_add(1, Ordering::Relaxed);
        self.publish(EngineNotification::EventApplied {
            region: region_id.to_string(),
            event_id: event.id,
            kind: event.kind,
        });
    }

    fn resolve_group(&self, region_id: &str, group: Vec<ReplicationEvent>) {
        self.stats.conflicts_detected.fetch_add(1, Ordering::Relaxed);

        let resolution = match self.resolver.resolve(&group) {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(
                    region = %region_id,
                    event = %group[0].id,
                    error = %err,
                    "conflict resolution failed, group skipped for this tick"
                );
                return;
            }
        };

        if resolution.strategy == ResolutionStrategy::ManualResolve {
            self.stats.manual_resolutions.fetch_add(1, Ordering::Relaxed);
            warn!(
                region = %region_id,
                event = %resolution.event_id,
                "conflict requires manual resolution, no state mutated"
            );
            self.publish(EngineNotification::ManualResolutionRequired {
                region: region_id.to_string(),
                resolution,
            });
            return;
        }

        let resolved = match resolution.resolved.as_ref() {
            Some(value) => value,
            None => return,
        };
        if let Err(err) = (self.apply)(resolved, group[0].kind, &resolution.event_id) {
            warn!(
                region = %region_id,
                event = %resolution.event_id,
                error = %err,
                "apply callback failed for resolved conflict, clock not merged"
            );
            return;
        }

        let clocks: Vec<VectorClock> = group.iter().map(|e| e.clock.clone()).collect();
        self.merge_applied(region_id, &clocks);
        self.registry.record_conflict(
            region_id,
            self.config.conflict_rate_increment,
            self.config.conflict_rate_decay,
        );
        self.stats.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
        self.publish(EngineNotification::ConflictResolved {
            region: region_id.to_string(),
            resolution,
        });
    }

    /// Fold applied event clocks into the aggregate clock and into the
    /// delivered-to region's causal view.
    fn merge_applied(&self, region_id: &str, applied: &[VectorClock]) {
        let mut clocks = self.clocks.write();
        for clock in applied {
            clocks.local.merge(clock);
        }
        let region_clock = clocks.regions.entry(region_id.to_string()).or_default();
        for clock in applied {
            region_clock.merge(clock);
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Start the periodic drain loop. Call as `engine.clone().start()` on an
    /// `Arc`-held engine; the loop owns one reference until stopped.
    pub fn start(self: Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GeorepError::AlreadyRunning);
        }
        info!(
            region = %self.config.local_region,
            interval = ?self.config.tick_interval,
            "starting replication engine"
        );

        let mut shutdown = self.shutdown_tx.subscribe();
        let engine = self;
        tokio::spawn(async move {
            let mut ticker = interval(engine.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => engine.tick(),
                    _ = shutdown.recv() => {
                        debug!("replication tick loop stopped");
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    /// Stop the drain loop and cancel any pending partition-restoration
    /// timers. An in-flight tick finishes its current work.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(GeorepError::NotRunning);
        }
        let _ = self.shutdown_tx.send(());
        info!("replication engine stopped");
        Ok(())
    }

    // -- Partition simulation -----------------------------------------------

    /// Mark a region partitioned now and restore it after `duration`.
    ///
    /// The restoration is a cancellable deferred task, not a blocking wait;
    /// `stop` cancels it. The region's queue keeps accumulating while
    /// partitioned and drains normally once health returns.
    pub fn simulate_partition(&self, region_id: &str, duration: Duration) -> Result<()> {
        self.registry
            .set_health(region_id, RegionHealth::Partitioned)?;
        info!(region = %region_id, ?duration, "simulated partition started");
        self.publish(EngineNotification::PartitionStarted {
            region: region_id.to_string(),
            duration_ms: duration.as_millis() as u64,
        });

        let registry = Arc::clone(&self.registry);
        let notify_tx = self.notify_tx.clone();
        let region = region_id.to_string();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(duration) => {
                    let _ = registry.set_health(&region, RegionHealth::Active);
                    registry.touch_sync(&region, unix_millis());
                    info!(region = %region, "simulated partition recovered");
                    let _ = notify_tx.send(EngineNotification::PartitionRecovered { region });
                }
                _ = shutdown.recv() => {
                    debug!(region = %region, "partition recovery cancelled by shutdown");
                }
            }
        });
        Ok(())
    }

    // -- Administration & observation ----------------------------------------

    /// Subscribe to engine notifications
    pub fn subscribe(&self) -> broadcast::Receiver<EngineNotification> {
        self.notify_tx.subscribe()
    }

    /// Snapshot of the engine's aggregate clock
    pub fn current_clock(&self) -> VectorClock {
        self.clocks.read().local.clone()
    }

    /// Snapshot of one region's causal view
    pub fn region_clock(&self, region_id: &str) -> Option<VectorClock> {
        self.clocks.read().regions.get(region_id).cloned()
    }

    /// Snapshot of all known regions
    pub fn regions(&self) -> Vec<Region> {
        self.registry.list()
    }

    /// Snapshot of one region
    pub fn region(&self, region_id: &str) -> Option<Region> {
        self.registry.get(region_id)
    }

    /// Set a region's health state (external health-check collaborator)
    pub fn set_region_health(&self, region_id: &str, health: RegionHealth) -> Result<()> {
        self.registry.set_health(region_id, health)
    }

    /// Number of events awaiting delivery to a region
    pub fn pending_events(&self, region_id: &str) -> Result<usize> {
        self.registry.queue_len(region_id)
    }

    /// Override the strategy used for a conflict type
    pub fn set_strategy(&self, conflict_type: ConflictType, strategy: ResolutionStrategy) {
        self.resolver.set_strategy(conflict_type, strategy);
    }

    /// Route a conflict type to manual resolution
    pub fn clear_strategy(&self, conflict_type: ConflictType) {
        self.resolver.clear_strategy(conflict_type);
    }

    /// Snapshot of engine statistics
    pub fn stats(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            events_replicated: self.stats.events_replicated.load(Ordering::Relaxed),
            events_applied: self.stats.events_applied.load(Ordering::Relaxed),
            events_dropped: self.stats.events_dropped.load(Ordering::Relaxed),
            conflicts_detected: self.stats.conflicts_detected.load(Ordering::Relaxed),
            conflicts_resolved: self.stats.conflicts_resolved.load(Ordering::Relaxed),
            manual_resolutions: self.stats.manual_resolutions.load(Ordering::Relaxed),
            ticks: self.stats.ticks.load(Ordering::Relaxed),
            ticks_skipped: self.stats.ticks_skipped.load(Ordering::Relaxed),
        }
    }

    /// The engine's configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn publish(&self, notification: EngineNotification) {
        // Fire-and-forget: no receivers is not an error.
        let _ = self.notify_tx.send(notification);
    }
}
