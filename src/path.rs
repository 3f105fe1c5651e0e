//! Path Record
//!
//! `Path` is the in-memory toolpath the limiter operates on: a polyline plus
//! a read-only handle to the wire metadata it was built from, a currently
//! assigned speed, and the flow values derived from that speed. Sub-paths
//! produced during limiting share the same metadata handle rather than
//! cloning it, per `spec.md` §9's note on the back-reference.

use crate::geometry::{lerp_truncate, segment_length, Direction, Point, Polyline};
use crate::wire::WireGCodePath;
use std::sync::Arc;

/// The read-only subset of a wire path's fields the limiter consumes, plus
/// the original wire record so unrelated fields round-trip untouched.
#[derive(Debug, Clone)]
pub struct PathMetadata {
    /// `speed_derivatives.velocity`, in mm/s, before any limiting.
    pub target_velocity: f64,
    pub speed_factor: f64,
    pub speed_back_pressure_factor: f64,
    pub flow: f64,
    pub width_factor: f64,
    pub line_width: f64,
    pub layer_thickness: f64,
    pub flow_ratio: f64,
    pub retract: bool,
    /// The original wire record, used as an emission template: `points` and
    /// `speed_derivatives.velocity` are overwritten on output, every other
    /// field (including anything in `extra`) is copied verbatim.
    template: WireGCodePath,
}

impl PathMetadata {
    pub fn from_wire(wire: &WireGCodePath) -> Self {
        Self {
            target_velocity: wire.speed_derivatives.velocity,
            speed_factor: wire.speed_factor,
            speed_back_pressure_factor: wire.speed_back_pressure_factor,
            flow: wire.flow,
            width_factor: wire.width_factor,
            line_width: wire.line_width,
            layer_thickness: wire.layer_thickness,
            flow_ratio: wire.flow_ratio,
            retract: wire.retract,
            template: wire.clone(),
        }
    }

    /// Target speed absent any limiting, in µm/s.
    pub fn target_speed(&self) -> f64 {
        self.target_velocity * self.speed_factor * self.speed_back_pressure_factor * 1000.0
    }

    /// Cross-sectional extrusion volume per mm of travel, in µm³/µm.
    /// Depends only on metadata, never on the current speed.
    pub fn extrusion_volume_per_mm(&self) -> f64 {
        self.flow * self.width_factor * self.line_width * self.layer_thickness * self.flow_ratio
    }

    /// The flow this path would run at absent limiting, in µm³/s.
    pub fn target_flow(&self) -> f64 {
        self.extrusion_volume_per_mm() * self.target_speed()
    }
}

/// A toolpath: a polyline assigned a (possibly limited) speed.
#[derive(Debug, Clone)]
pub struct Path {
    pub metadata: Arc<PathMetadata>,
    pub points: Polyline,
    /// Currently assigned speed, in µm/s.
    pub speed: f64,
    /// Flow at the current speed, in µm³/s.
    pub flow: f64,
    /// The flow this path would run at absent limiting, in µm³/s.
    pub setpoint_flow: f64,
}

impl Path {
    /// Builds a `Path` at its target (unlimited) speed.
    pub fn from_metadata(metadata: Arc<PathMetadata>, points: Polyline) -> Self {
        let speed = metadata.target_speed();
        let flow = metadata.extrusion_volume_per_mm() * speed;
        Self {
            metadata,
            points,
            speed,
            flow,
            setpoint_flow: flow,
        }
    }

    pub fn extrusion_volume_per_mm(&self) -> f64 {
        self.metadata.extrusion_volume_per_mm()
    }

    pub fn target_flow(&self) -> f64 {
        self.metadata.target_flow()
    }

    pub fn is_travel(&self) -> bool {
        self.target_flow() <= 0.0
    }

    pub fn is_retract(&self) -> bool {
        self.metadata.retract
    }

    /// Sum of Euclidean distances between consecutive points, in µm.
    pub fn total_length(&self) -> f64 {
        self.points.total_length()
    }

    /// `total_length / speed`, in seconds.
    pub fn total_duration(&self) -> f64 {
        self.total_length() / self.speed
    }

    /// Cuts a head of `partition_duration` seconds (at `partition_speed`)
    /// off the front (`Direction::Forward`) or back (`Direction::Backward`)
    /// of this path.
    ///
    /// Returns `(head, tail, leftover_duration)`. `tail` is `None` when the
    /// whole path is shorter than the requested budget, in which case `head`
    /// is the entire path (at `partition_speed`) and `leftover_duration` is
    /// the unused remainder of the budget.
    ///
    /// Preconditions: `points.len() >= 2` and `partition_speed > 0`.
    pub fn partition(
        &self,
        partition_duration: f64,
        partition_speed: f64,
        direction: Direction,
    ) -> (Path, Option<Path>, f64) {
        assert!(
            self.points.len_points() >= 2,
            "partition precondition violated: path has fewer than 2 points"
        );
        assert!(
            partition_speed > 0.0,
            "partition precondition violated: partition_speed must be positive"
        );

        let points = self.points.as_slice();
        let total_path_duration = self.total_length() / partition_speed;

        if partition_duration >= total_path_duration {
            let head = Path {
                metadata: self.metadata.clone(),
                points: self.points.clone(),
                speed: partition_speed,
                flow: self.flow,
                setpoint_flow: self.setpoint_flow,
            };
            let leftover = partition_duration - total_path_duration;
            return (head, None, leftover);
        }

        let forward = direction == Direction::Forward;
        let mut index: isize = if forward { 0 } else { points.len() as isize - 1 };
        let step: isize = if forward { 1 } else { -1 };
        let mut accumulated = 0.0;
        let mut prev = points[index as usize];

        loop {
            let next_index = index + step;
            let next = points[next_index as usize];
            let segment_duration = segment_length(prev, next) / partition_speed;

            if accumulated + segment_duration < partition_duration {
                prev = next;
                accumulated += segment_duration;
                index = next_index;
                continue;
            }

            let duration_left = partition_duration - accumulated;
            let ratio = (duration_left / segment_duration).clamp(0.0, 1.0);
            let cut = lerp_truncate(prev, next, ratio);

            // See `spec.md` §4.1: forward and backward traversal must land on
            // the same cut point and agree on which side of it is which.
            let cut_index = if forward { index + 1 } else { index };

            let mut left_points: Vec<Point> = points[0..cut_index as usize].to_vec();
            left_points.push(cut);

            let mut right_points: Vec<Point> = Vec::with_capacity(points.len() - cut_index as usize + 1);
            right_points.push(cut);
            right_points.extend_from_slice(&points[cut_index as usize..]);

            let (head_points, tail_points) = if forward {
                (left_points, right_points)
            } else {
                (right_points, left_points)
            };

            let head = Path {
                metadata: self.metadata.clone(),
                points: Polyline::new(head_points),
                speed: partition_speed,
                flow: self.flow,
                setpoint_flow: self.setpoint_flow,
            };
            let tail = Path {
                metadata: self.metadata.clone(),
                points: Polyline::new(tail_points),
                speed: self.speed,
                flow: self.flow,
                setpoint_flow: self.setpoint_flow,
            };
            return (head, Some(tail), 0.0);
        }
    }

    /// Emits this path back to its wire form. `include_first_point` should
    /// be `false` for every emitted path except the first in a batch, since
    /// Cura's connected line strings duplicate the previous path's last
    /// point as the next path's first (`spec.md` §4.3).
    pub fn to_wire(&self, include_first_point: bool) -> WireGCodePath {
        let mut wire = self.metadata.template.clone();
        let points = self.points.as_slice();
        wire.points = if include_first_point {
            points.to_vec()
        } else {
            points[1..].to_vec()
        };
        wire.speed_derivatives.velocity = self.speed * 1e-3;
        wire
    }
}
