//! Batch Processor
//!
//! A CLI subcommand that runs the limiter once against a JSON batch and a
//! settings file, without a live HTTP server — the same role
//! `klipper-host::batch::run_batch_processing` plays for offline G-code
//! analysis, here repurposed to replay a single slicer request.

use anyhow::{Context, Result};
use clap::Parser;
use gradual_flow_limiter::adapter::{process_batch, ClientId};
use gradual_flow_limiter::config::{self, ExtruderSettings};
use gradual_flow_limiter::debug::{DebugSink, SvgDebugSink};
use gradual_flow_limiter::geometry::Polyline;
use gradual_flow_limiter::path::{Path, PathMetadata};
use gradual_flow_limiter::wire::{ExtruderSettingsWire, ModifyRequest, WireGCodePath};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Arguments for the `batch` subcommand.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// Path to a JSON file holding a `ModifyRequest` body.
    #[arg(required = true)]
    input_json: PathBuf,

    /// Path to a JSON file holding the broadcast settings array (one map per
    /// extruder, index = extruder number). Defaults next to the input file
    /// as `settings.json` if not given.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Directory to write an `original`/`discretized` SVG pair into.
    #[arg(long)]
    svg_out: Option<PathBuf>,
}

fn wire_to_paths(wire_paths: &[WireGCodePath]) -> Vec<Path> {
    wire_paths
        .iter()
        .map(|wire| {
            let metadata = Arc::new(PathMetadata::from_wire(wire));
            Path::from_metadata(metadata, Polyline::new(wire.points.clone()))
        })
        .collect()
}

/// Runs the batch-processing logic.
pub fn run_batch_processing(args: BatchArgs) -> Result<()> {
    info!("processing batch from {:?}", args.input_json);

    let input_text = fs::read_to_string(&args.input_json)
        .with_context(|| format!("failed to read input batch: {:?}", args.input_json))?;
    let request: ModifyRequest =
        serde_json::from_str(&input_text).context("failed to parse input batch as JSON")?;

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| args.input_json.with_file_name("settings.json"));
    let settings_text = fs::read_to_string(&settings_path)
        .with_context(|| format!("failed to read settings file: {settings_path:?}"))?;
    let settings_maps: Vec<ExtruderSettingsWire> =
        serde_json::from_str(&settings_text).context("failed to parse settings file as JSON")?;
    let all_settings = config::parse_all(&settings_maps)?;
    let settings: ExtruderSettings = all_settings
        .get(request.extruder_nr as usize)
        .cloned()
        .with_context(|| format!("no settings entry for extruder {}", request.extruder_nr))?;

    let (output_paths, _trailing_flow) = process_batch(
        ClientId(0),
        request.extruder_nr,
        request.layer_nr,
        &request.gcode_paths,
        &settings,
        None,
    )?;

    if let Some(dir) = &args.svg_out {
        let original = wire_to_paths(&request.gcode_paths);
        let discretized = wire_to_paths(&output_paths);
        let sink = SvgDebugSink::new(dir);
        sink.write_batch(&original, &discretized);
        info!("wrote debug SVG pair to {dir:?}");
    }

    let output = serde_json::json!({ "gcode_paths": output_paths });
    println!("{}", serde_json::to_string_pretty(&output)?);

    info!("batch processing finished: {} path(s) emitted", output_paths.len());
    Ok(())
}
