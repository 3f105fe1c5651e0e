//! Limiter State Machine
//!
//! The two-pass flow limiter: a forward pass clamps flow *increases* to the
//! acceleration budget, then a backward pass clamps flow *decreases* to the
//! deceleration budget. Discretized duration carries across path boundaries
//! as an explicit accumulator (`discretized_duration_remaining`) rather than
//! hidden state, per `spec.md` §9, so each pass is a pure fold over its
//! input list.

use crate::geometry::Direction;
use crate::path::Path;

/// Where a given `(client, extruder)` sits relative to a steady extrusion
/// run. Reused across requests only if continuity is explicitly enabled by
/// the adapter (`spec.md` §4.3); the state machine itself has no memory
/// beyond one `processGcodePaths` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Undefined,
    Transition,
    Stable,
}

/// Mutable scalars threaded through one `process_paths` call.
#[derive(Debug, Clone)]
pub struct LimiterState {
    /// µm³/s
    pub current_flow: f64,
    /// µm³/s²
    pub flow_acceleration: f64,
    /// µm³/s²
    pub flow_deceleration: f64,
    /// s — the quantum sub-paths are chopped into.
    pub discretized_duration: f64,
    /// s — carried across path boundaries within one pass.
    pub discretized_duration_remaining: f64,
    /// µm³/s — seeds the backward pass.
    pub target_end_flow: f64,
    /// µm³/s
    pub setpoint_flow: f64,
    pub flow_state: FlowState,
    /// s — travel duration above which (or any retract) resets to `Undefined`.
    pub reset_flow_duration: f64,
}

impl LimiterState {
    pub fn new(
        initial_flow: f64,
        flow_acceleration: f64,
        flow_deceleration: f64,
        discretized_duration: f64,
        reset_flow_duration: f64,
    ) -> Self {
        Self {
            current_flow: initial_flow,
            flow_acceleration,
            flow_deceleration,
            discretized_duration,
            discretized_duration_remaining: 0.0,
            target_end_flow: initial_flow,
            setpoint_flow: initial_flow,
            flow_state: FlowState::Stable,
            reset_flow_duration,
        }
    }

    /// Runs the forward pass, then the backward pass, over `paths`.
    pub fn process_paths(&mut self, paths: &[Path]) -> Vec<Path> {
        self.discretized_duration_remaining = 0.0;

        let mut forward = Vec::new();
        for path in paths {
            forward.extend(self.process_path(path, Direction::Forward));
        }

        self.discretized_duration_remaining = 0.0;
        // If the forward pass never reached `target_end_flow`, decelerating
        // from a flow we never attained makes no sense: clamp down instead.
        self.current_flow = self.current_flow.min(self.target_end_flow);

        // `process_path` in `Backward` mode always cuts from the tail end
        // first, so each call's own sub-list comes back in reverse spatial
        // order. Un-reverse it, then place that corrected block in front of
        // whatever later (already correctly ordered) paths we've built up.
        let mut backward: Vec<Path> = Vec::new();
        for path in forward.iter().rev() {
            let mut local = self.process_path(path, Direction::Backward);
            local.reverse();
            local.extend(backward);
            backward = local;
        }
        backward
    }

    /// Processes a single path in one direction, returning its sub-paths.
    fn process_path(&mut self, path: &Path, direction: Direction) -> Vec<Path> {
        if self.flow_state == FlowState::Undefined {
            self.current_flow = self.setpoint_flow;
        }

        if path.is_travel() {
            if path.is_retract() || path.total_duration() > self.reset_flow_duration {
                self.flow_state = FlowState::Undefined;
            }
            return vec![path.clone()];
        }

        self.setpoint_flow = path.setpoint_flow;

        let target_flow = path.flow;
        let extrusion_volume_per_mm = path.extrusion_volume_per_mm();

        if target_flow <= self.current_flow {
            self.current_flow = target_flow;
            self.discretized_duration_remaining = 0.0;
            return vec![path.clone()];
        }

        let mut discretized = Vec::new();
        let mut remaining_path = path.clone();

        if self.discretized_duration_remaining > 0.0 {
            let segment_speed = self.current_flow / extrusion_volume_per_mm;
            let (head, tail, remaining_partition_duration) = remaining_path.partition(
                self.discretized_duration_remaining,
                segment_speed,
                direction,
            );
            self.discretized_duration_remaining =
                (self.discretized_duration_remaining - remaining_partition_duration).max(0.0);
            match tail {
                Some(tail) => {
                    discretized.push(head);
                    remaining_path = tail;
                }
                None => return vec![head],
            }
        }

        while self.current_flow < target_flow {
            let delta = match direction {
                Direction::Forward => self.flow_acceleration,
                Direction::Backward => self.flow_deceleration,
            } * self.discretized_duration;
            self.current_flow = (self.current_flow + delta).min(target_flow);

            let segment_speed = self.current_flow / extrusion_volume_per_mm;

            if self.current_flow == target_flow {
                remaining_path.speed = segment_speed;
                self.discretized_duration_remaining =
                    (self.discretized_duration_remaining - remaining_path.total_duration()).max(0.0);
                discretized.push(remaining_path);
                return discretized;
            }

            let (head, tail, remaining_partition_duration) =
                remaining_path.partition(self.discretized_duration, segment_speed, direction);
            discretized.push(head);

            match tail {
                Some(tail) => remaining_path = tail,
                None => {
                    self.discretized_duration_remaining = remaining_partition_duration;
                    return discretized;
                }
            }
        }

        discretized.push(remaining_path);
        self.flow_state = if self.discretized_duration_remaining > 0.0 {
            FlowState::Transition
        } else {
            FlowState::Stable
        };
        discretized
    }
}
