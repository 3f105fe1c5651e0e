//! # Gradual Flow Limiter
//!
//! An RPC worker that rewrites extrusion toolpaths so volumetric flow rate
//! never changes faster than a configured acceleration bound. A slicer calls
//! it once per layer per extruder; see `SPEC_FULL.md` for the full contract.
//!
//! ## Responsibilities
//!
//! *   Accepting a batch of toolpaths and per-extruder limiting settings.
//! *   Running the two-pass (forward acceleration, backward deceleration)
//!     limiter and re-discretizing paths that cross a ramp step boundary.
//! *   Serving the result, plus a small status surface, over HTTP.
//!
//! ## Concurrency
//!
//! One task per request; the limiter itself never suspends. Configuration is
//! read-mostly behind a `parking_lot::RwLock`, replaced wholesale on a
//! broadcast.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gradual_flow_limiter::rpc;
use gradual_flow_limiter::state::AppState;
use std::sync::Arc;
use tracing::info;

mod batch;

/// RPC worker that applies a gradual flow limit to extrusion toolpaths.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server that serves modify/broadcast/status requests.
    Run(RunArgs),
    /// Process one batch file offline and print the modified paths.
    Batch(batch::BatchArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
struct RunArgs {
    /// Address to bind the HTTP server to.
    #[arg(short, long, default_value = "localhost")]
    address: String,

    /// Port to bind the HTTP server to. 33800 matches the original plugin's
    /// documented default (`original_source/include/plugin/cmdline.h`).
    #[arg(short, long, default_value_t = 33800)]
    port: u16,
}

#[actix_rt::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_server(args).await,
        Commands::Batch(args) => batch::run_batch_processing(args),
    }
}

async fn run_server(args: RunArgs) -> Result<()> {
    info!("starting gradual flow limiter on {}:{}", args.address, args.port);

    let app_state = Arc::new(AppState::new());
    let server = rpc::start_server(&args.address, args.port, app_state)?;

    tokio::select! {
        result = server => {
            result?;
            info!("HTTP server shut down.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, exiting.");
        }
    }

    Ok(())
}
