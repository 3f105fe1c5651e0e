//! Gradual flow limiter
//!
//! Rewrites extrusion toolpaths so volumetric flow rate never changes faster
//! than a configured acceleration bound, as an RPC worker a slicer calls
//! once per layer per extruder. See `SPEC_FULL.md` for the full contract.

pub mod adapter;
pub mod config;
pub mod debug;
pub mod errors;
pub mod geometry;
pub mod limiter;
pub mod path;
pub mod rpc;
pub mod state;
pub mod wire;
