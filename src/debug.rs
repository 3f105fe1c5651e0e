//! Debug Sink
//!
//! Optional SVG dump of a batch's original and discretized paths, coloured
//! by flow. Expressed as a trait so the RPC layer can run with a no-op sink
//! in production and the `batch` CLI subcommand can point it at a directory.

use crate::path::Path;
use std::path::{Path as FsPath, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Numbers debug snapshots across the life of the process. Explicit,
/// process-global state rather than a hidden singleton (`spec.md` §9).
static SNAPSHOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_snapshot_id() -> u64 {
    SNAPSHOT_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Receives a before/after pair for one processed batch.
pub trait DebugSink: Send + Sync {
    fn write_batch(&self, original: &[Path], discretized: &[Path]);
}

/// Drops every batch on the floor. The default for the HTTP server.
pub struct NullDebugSink;

impl DebugSink for NullDebugSink {
    fn write_batch(&self, _original: &[Path], _discretized: &[Path]) {}
}

/// Writes `original-<n>.svg` / `discretized-<n>.svg` into a directory.
pub struct SvgDebugSink {
    directory: PathBuf,
}

impl SvgDebugSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl DebugSink for SvgDebugSink {
    fn write_batch(&self, original: &[Path], discretized: &[Path]) {
        let id = next_snapshot_id();
        if let Err(e) = std::fs::create_dir_all(&self.directory) {
            warn!("failed to create debug sink directory: {e}");
            return;
        }
        if let Err(e) = write_svg(&self.directory.join(format!("original-{id}.svg")), original) {
            warn!("failed to write original debug snapshot: {e}");
        }
        if let Err(e) = write_svg(&self.directory.join(format!("discretized-{id}.svg")), discretized) {
            warn!("failed to write discretized debug snapshot: {e}");
        }
    }
}

fn write_svg(path: &FsPath, paths: &[Path]) -> std::io::Result<()> {
    let mut body = String::from("<svg xmlns=\"http://www.w3.org/2000/svg\">\n");
    for p in paths {
        body.push_str(&path_svg_element(p));
        body.push('\n');
    }
    body.push_str("</svg>\n");
    std::fs::write(path, body)
}

fn path_svg_element(path: &Path) -> String {
    let data = path_svg_data(path);
    if path.is_travel() {
        return format!("<path d=\"{data}\" fill=\"none\" stroke=\"black\" stroke-width=\"0.05\" />");
    }
    let (r, g, b) = hsv_to_rgb(path.flow * 0.00000003, 1.0, 1.0);
    format!("<path d=\"{data}\" fill=\"none\" stroke=\"rgb({r},{g},{b})\" stroke-width=\"0.1\" />")
}

fn path_svg_data(path: &Path) -> String {
    let mut data = String::new();
    for (i, point) in path.points.as_slice().iter().enumerate() {
        let command = if i == 0 { "M" } else { "L" };
        data.push_str(&format!("{command}{} {} ", point.x as f64 * 1e-3, point.y as f64 * 1e-3));
    }
    data
}

/// Hue-only HSV to RGB conversion (full saturation/value), used to map flow
/// magnitude onto a visually distinct stroke colour.
fn hsv_to_rgb(hue_fraction: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
    let h = (hue_fraction.rem_euclid(1.0)) * 6.0;
    let i = h.floor() as i32;
    let f = h - h.floor();
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * f);
    let t = value * (1.0 - saturation * (1.0 - f));

    let (r, g, b) = match i.rem_euclid(6) {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };

    (
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Polyline};
    use crate::path::PathMetadata;
    use crate::wire::{SpeedDerivatives, WireGCodePath};
    use serde_json::Map;
    use std::sync::Arc;

    fn mock_path(velocity: f64) -> Path {
        let wire = WireGCodePath {
            points: vec![],
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
        };
        let metadata = Arc::new(PathMetadata::from_wire(&wire));
        Path::from_metadata(metadata, Polyline::new(vec![Point::new(0, 0), Point::new(0, 1000)]))
    }

    #[test]
    fn svg_sink_writes_both_files() {
        let dir = std::env::temp_dir().join(format!("gradual-flow-svg-test-{}", next_snapshot_id()));
        let sink = SvgDebugSink::new(&dir);
        let original = vec![mock_path(100.0)];
        let discretized = vec![mock_path(50.0), mock_path(100.0)];
        sink.write_batch(&original, &discretized);

        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn travel_path_renders_black_stroke() {
        let travel = mock_path(0.0);
        assert!(path_svg_element(&travel).contains("stroke=\"black\""));
    }
}
