//! Wire Schema
//!
//! The on-wire JSON shape for a single toolpath, and the batch request/response
//! envelopes that carry them. We only type the fields the limiter actually
//! reads or rewrites (`spec.md` §6); everything else round-trips through the
//! `extra` catch-all untouched.

use crate::geometry::Point;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `speed_derivatives.velocity`, the only nested field we touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedDerivatives {
    pub velocity: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single toolpath as it arrives over / leaves the wire.
///
/// `extra` absorbs every field this service doesn't interpret (layer height
/// hints, line-type tags, whatever a future Cura version adds) so they come
/// back out unchanged, per the round-tripping invariant in `spec.md` §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireGCodePath {
    pub points: Vec<Point>,
    pub flow: f64,
    pub width_factor: f64,
    pub line_width: f64,
    pub layer_thickness: f64,
    pub flow_ratio: f64,
    pub speed_factor: f64,
    pub speed_back_pressure_factor: f64,
    pub retract: bool,
    pub speed_derivatives: SpeedDerivatives,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /plugin/gradual-flow/v0/modify`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModifyRequest {
    pub gcode_paths: Vec<WireGCodePath>,
    pub extruder_nr: u32,
    pub layer_nr: i32,
}

/// Response body of `POST /plugin/gradual-flow/v0/modify`.
#[derive(Debug, Clone, Serialize)]
pub struct ModifyResponse {
    pub gcode_paths: Vec<WireGCodePath>,
}

/// Per-extruder settings map as broadcast: `_plugin__<name>__<M>_<m>_<p>__<key>` -> value.
pub type ExtruderSettingsWire = std::collections::HashMap<String, String>;

/// Body of `POST /plugin/gradual-flow/v0/broadcast`.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    pub extruder_settings: Vec<ExtruderSettingsWire>,
}
