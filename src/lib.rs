//! # georep
//!
//! Cross-region replication core: propagates write events across a small set
//! of geographically distributed regions, tracks causal ordering with
//! per-region vector clocks, detects conflicting writes to the same logical
//! record, and resolves them deterministically.
//!
//! This is best-effort asynchronous propagation with deterministic, auditable
//! conflict resolution: not a consensus protocol and not a general-purpose
//! CRDT library. Durable storage of the replicated records stays with the
//! caller, reached through the apply callback.
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`clock`] | Vector clocks: increment, merge, causal comparison |
//! | [`event`] | Replication events and their kinds |
//! | [`resolver`] | Conflict classification and deterministic resolution |
//! | [`registry`] | Region set, health states, per-region outbound queues |
//! | [`engine`] | The orchestrator: stamping, fan-out, drain loop, partitions |
//! | [`notify`] | Notifications emitted for observers |
//! | [`config`] | Engine configuration |
//! | [`error`] | Error types |
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use georep::{
//!     ApplyCallback, EngineConfig, EventKind, ReplicationEngine, ReplicationEvent,
//! };
//!
//! let apply: ApplyCallback = Box::new(|payload, kind, id| {
//!     println!("apply {kind} {id}: {payload}");
//!     Ok(())
//! });
//! let engine = Arc::new(ReplicationEngine::new(EngineConfig::default(), apply));
//!
//! let event = ReplicationEvent::new(
//!     "tweet-1",
//!     EventKind::RecordCreate,
//!     json!({"content": "hello from virginia"}),
//!     "us-east",
//!     vec!["eu-west".to_string(), "asia-pacific".to_string()],
//! );
//! engine.replicate(event)?;
//! engine.tick();
//! # Ok::<(), georep::GeorepError>(())
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod notify;
pub mod registry;
pub mod resolver;

pub use clock::{CausalOrder, RegionId, VectorClock};
pub use config::{EngineConfig, RegionSpec};
pub use engine::{ApplyCallback, EngineStats, EngineStatsSnapshot, ReplicationEngine};
pub use error::{GeorepError, Result};
pub use event::{EventKind, ReplicationEvent};
pub use notify::EngineNotification;
pub use registry::{Region, RegionHealth, RegionRegistry};
pub use resolver::{ConflictResolution, ConflictResolver, ConflictType, ResolutionStrategy};
