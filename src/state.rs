//! Application State
//!
//! The state shared across every RPC handler: the broadcast settings table,
//! the cross-request trailing-flow map, and a small set of counters for the
//! status endpoint. Mirrors `klipper-host::state::PrinterState` in shape —
//! one struct, wrapped in lock types chosen per field's access pattern.

use crate::adapter::TrailingFlowKey;
use crate::config::ExtruderSettings;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters surfaced by `GET /plugin/gradual-flow/v0/status`.
#[derive(Debug, Default)]
pub struct RequestCounters {
    pub modify_requests: AtomicU64,
    pub broadcast_requests: AtomicU64,
    pub modify_failures: AtomicU64,
}

/// Everything handlers need, shared behind an `Arc` across the server.
pub struct AppState {
    /// Per-extruder settings, replaced wholesale on a successful broadcast.
    /// Read-mostly: every `modify` request reads it, broadcasts are rare.
    pub settings: RwLock<Vec<ExtruderSettings>>,
    /// Last non-zero emitted flow per (client, extruder), consulted only
    /// when an extruder's settings enable `continuity_enabled`.
    pub trailing_flow: Mutex<HashMap<TrailingFlowKey, f64>>,
    pub counters: RequestCounters,
    pub started_at: Instant,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(Vec::new()),
            trailing_flow: Mutex::new(HashMap::new()),
            counters: RequestCounters::default(),
            started_at: Instant::now(),
        }
    }

    /// Settings for one extruder, or `None` if it's never been configured.
    pub fn extruder_settings(&self, extruder_nr: u32) -> Option<ExtruderSettings> {
        self.settings.read().get(extruder_nr as usize).cloned()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot served by the status endpoint and WebSocket stream.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub uptime_seconds: u64,
    pub modify_requests: u64,
    pub broadcast_requests: u64,
    pub modify_failures: u64,
    pub configured_extruders: usize,
}

impl AppState {
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            modify_requests: self.counters.modify_requests.load(Ordering::Relaxed),
            broadcast_requests: self.counters.broadcast_requests.load(Ordering::Relaxed),
            modify_failures: self.counters.modify_failures.load(Ordering::Relaxed),
            configured_extruders: self.settings.read().len(),
        }
    }
}
