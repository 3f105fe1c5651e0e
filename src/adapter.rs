//! Batch Adapter
//!
//! Per-request orchestration: reconstructs self-contained polylines from
//! Cura's connected line strings, instantiates the limiter with per-extruder
//! parameters, runs it, and re-serializes the result. This is the only layer
//! that knows about wire paths, extruder indices, and cross-request state;
//! `limiter`/`path`/`geometry` know nothing about requests at all.

use crate::config::ExtruderSettings;
use crate::errors::LimiterError;
use crate::geometry::{Point, Polyline};
use crate::limiter::{FlowState, LimiterState};
use crate::path::{Path, PathMetadata};
use crate::wire::WireGCodePath;
use std::sync::Arc;

/// Identifies a client for the purposes of cross-request trailing flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

/// Key into the trailing-flow map: one scalar per connected client and
/// extruder.
pub type TrailingFlowKey = (ClientId, u32);

/// Runs the adapter contract of `spec.md` §4.3 for one batch.
///
/// `trailing_flow` is `Some(previous flow)` only when the extruder's
/// settings enable cross-request continuity and a previous request already
/// recorded one; otherwise the limiter seeds from the batch's own first
/// target flow.
pub fn process_batch(
    client: ClientId,
    extruder_nr: u32,
    layer_nr: i32,
    wire_paths: &[WireGCodePath],
    settings: &ExtruderSettings,
    trailing_flow: Option<f64>,
) -> Result<(Vec<WireGCodePath>, Option<f64>), LimiterError> {
    let _ = (client, layer_nr);

    if !settings.enabled {
        return Ok((wire_paths.to_vec(), None));
    }

    let paths = reconstruct_paths(wire_paths)?;
    if paths.is_empty() {
        return Ok((Vec::new(), None));
    }

    let target_flow = paths
        .iter()
        .map(|p| p.flow)
        .find(|&flow| flow != 0.0)
        .unwrap_or(0.0);

    let initial_flow = if settings.continuity_enabled {
        trailing_flow.unwrap_or(target_flow)
    } else {
        target_flow
    };

    let flow_acceleration = if layer_nr == 0 {
        settings.layer_0_max_flow_acceleration
    } else {
        settings.max_flow_acceleration
    };

    let mut state = LimiterState::new(
        initial_flow,
        flow_acceleration,
        flow_acceleration,
        settings.discretized_duration,
        settings.reset_flow_duration,
    );
    state.target_end_flow = target_flow;
    state.setpoint_flow = target_flow;
    state.flow_state = FlowState::Stable;

    let discretized = state.process_paths(&paths);

    let last_non_zero_flow = discretized
        .iter()
        .rev()
        .map(|p| p.flow)
        .find(|&flow| flow != 0.0);

    let output = discretized
        .iter()
        .enumerate()
        .map(|(i, path)| path.to_wire(i == 0))
        .collect();

    Ok((output, last_non_zero_flow))
}

/// Rebuilds self-contained polylines from Cura's connected line strings: the
/// first path's points are taken as-is; every subsequent path gets the
/// previous path's last point prepended as its own first point.
fn reconstruct_paths(wire_paths: &[WireGCodePath]) -> Result<Vec<Path>, LimiterError> {
    let mut paths = Vec::with_capacity(wire_paths.len());
    let mut previous_last_point: Option<Point> = None;

    for wire in wire_paths {
        if wire.points.is_empty() {
            return Err(LimiterError::Geometry(0));
        }

        let mut points: Vec<Point> = Vec::with_capacity(wire.points.len() + 1);
        if let Some(prev) = previous_last_point {
            points.push(prev);
        }
        points.extend_from_slice(&wire.points);

        if points.len() < 2 {
            return Err(LimiterError::Geometry(points.len()));
        }

        previous_last_point = Some(*wire.points.last().unwrap());

        let metadata = Arc::new(PathMetadata::from_wire(wire));
        paths.push(Path::from_metadata(metadata, Polyline::new(points)));
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SpeedDerivatives;
    use serde_json::Map;

    fn wire_path(points: Vec<Point>, velocity: f64) -> WireGCodePath {
        WireGCodePath {
            points,
            flow: 1.0,
            width_factor: 1.0,
            line_width: 400.0,
            layer_thickness: 250.0,
            flow_ratio: 1.0,
            speed_factor: 1.0,
            speed_back_pressure_factor: 1.0,
            retract: false,
            speed_derivatives: SpeedDerivatives {
                velocity,
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    fn settings() -> ExtruderSettings {
        ExtruderSettings {
            enabled: true,
            max_flow_acceleration: 1e9,
            layer_0_max_flow_acceleration: 1e9,
            discretized_duration: 0.1,
            reset_flow_duration: 0.1,
            continuity_enabled: false,
        }
    }

    #[test]
    fn disabled_extruder_echoes_input() {
        let mut s = settings();
        s.enabled = false;
        let input = vec![wire_path(vec![Point::new(0, 0), Point::new(0, 100)], 100.0)];
        let (out, trailing) = process_batch(ClientId(1), 0, 1, &input, &s, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].points, input[0].points);
        assert!(trailing.is_none());
    }

    #[test]
    fn subsequent_path_stitches_from_previous_last_point() {
        let s = settings();
        let input = vec![
            wire_path(vec![Point::new(0, 0), Point::new(0, 100_000)], 100.0),
            wire_path(vec![Point::new(100_000, 100_000)], 100.0),
        ];
        let (out, _) = process_batch(ClientId(1), 0, 1, &input, &s, None).unwrap();
        // the first output path keeps all points; every subsequent path drops
        // the stitched leading point again on the way back out.
        assert_eq!(out[0].points[0], Point::new(0, 0));
        let last = out.last().unwrap();
        assert_eq!(last.points[0], Point::new(100_000, 100_000));
    }

    #[test]
    fn layer_0_uses_layer_0_acceleration() {
        let mut s = settings();
        s.max_flow_acceleration = 1e7;
        s.layer_0_max_flow_acceleration = 1e12;
        let input = vec![
            wire_path(vec![Point::new(0, 0), Point::new(0, 1_000)], 10.0),
            wire_path(vec![Point::new(0, 1_000), Point::new(0, 100_000_000)], 100.0),
        ];

        let (layer_0_out, _) = process_batch(ClientId(1), 0, 0, &input, &s, None).unwrap();
        let (layer_1_out, _) = process_batch(ClientId(1), 0, 1, &input, &s, None).unwrap();

        // the same flow jump takes far fewer discretization steps under the
        // (enormous) layer-0 acceleration than under the general one.
        assert!(layer_0_out.len() < layer_1_out.len());
    }

    #[test]
    fn continuity_seeds_from_previous_trailing_flow() {
        let mut s = settings();
        s.continuity_enabled = true;
        let input = vec![wire_path(vec![Point::new(0, 0), Point::new(0, 100_000_000)], 100.0)];
        let target_flow = 100_000.0 * (100.0 * 1000.0);
        let (out, trailing) = process_batch(ClientId(1), 0, 1, &input, &s, Some(target_flow)).unwrap();
        // already at target flow from the start: no ramp needed, single output path.
        assert_eq!(out.len(), 1);
        assert!(trailing.is_some());
    }
}
