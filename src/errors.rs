//! Error types for the limiter and its surrounding host.

use thiserror::Error;

/// Errors that can occur while handling a single batch request.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// A wire path lacked a required field, or the JSON body didn't parse.
    #[error("failed to decode gcode path batch: {0}")]
    Decode(String),

    /// A polyline had fewer than two points where extrusion was expected.
    #[error("path has {0} point(s), need at least 2")]
    Geometry(usize),

    /// A required broadcast setting was missing or unparseable.
    #[error("incomplete configuration for extruder {extruder}: {detail}")]
    ConfigIncomplete { extruder: usize, detail: String },

    /// The RPC channel dropped mid-request.
    #[error("transport error: {0}")]
    Transport(String),
}
