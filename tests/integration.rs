//! Integration Tests
//!
//! These tests spin up the whole HTTP server in a background thread and then
//! interact with it using a real network client (`reqwest`) to verify
//! end-to-end behavior across the broadcast -> modify -> status surfaces.

use gradual_flow_limiter::rpc;
use gradual_flow_limiter::state::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Spawns a test server instance bound to a random local port.
fn spawn_test_server() -> u16 {
    let port = 20_000 + (rand::random::<u16>() % 20_000);
    let app_state = Arc::new(AppState::new());

    std::thread::spawn(move || {
        let rt = actix_rt::System::new();
        rt.block_on(async {
            let server = rpc::start_server("127.0.0.1", port, app_state).unwrap();
            server.await.unwrap();
        });
    });

    std::thread::sleep(Duration::from_millis(150));
    port
}

fn broadcast_body() -> Value {
    json!([{
        "_plugin__gradualflow__0_1_0__gradual_flow_enabled": "true",
        "_plugin__gradualflow__0_1_0__max_flow_acceleration": "1.0",
        "_plugin__gradualflow__0_1_0__layer_0_max_flow_acceleration": "1.0",
        "_plugin__gradualflow__0_1_0__gradual_flow_discretisation_step_size": "0.05"
    }])
}

#[tokio::test]
async fn broadcast_then_modify_round_trips_a_batch() {
    let port = spawn_test_server();
    let base = format!("http://127.0.0.1:{port}");
    let client = reqwest::Client::new();

    let broadcast_resp = client
        .post(format!("{base}/plugin/gradual-flow/v0/broadcast"))
        .json(&json!({ "extruder_settings": broadcast_body() }))
        .send()
        .await
        .unwrap();
    assert!(broadcast_resp.status().is_success());

    fn wire_path(points: Value, velocity: f64) -> Value {
        json!({
            "points": points,
            "flow": 1.0,
            "width_factor": 1.0,
            "line_width": 400.0,
            "layer_thickness": 250.0,
            "flow_ratio": 1.0,
            "speed_factor": 1.0,
            "speed_back_pressure_factor": 1.0,
            "retract": false,
            "speed_derivatives": {"velocity": velocity}
        })
    }

    // a slow path followed by a much faster one: the jump in target flow
    // should be split into multiple discretization steps rather than
    // emitted as a single path at the new speed.
    let modify_body = json!({
        "gcode_paths": [
            wire_path(json!([{"x": 0, "y": 0}, {"x": 0, "y": 1_000}]), 10.0),
            wire_path(json!([{"x": 0, "y": 1_000}, {"x": 0, "y": 100_000_000}]), 100.0)
        ],
        "extruder_nr": 0,
        "layer_nr": 1
    });

    let modify_resp = client
        .post(format!("{base}/plugin/gradual-flow/v0/modify"))
        .json(&modify_body)
        .send()
        .await
        .unwrap();
    assert!(modify_resp.status().is_success());

    let body: Value = modify_resp.json().await.unwrap();
    let paths = body["gcode_paths"].as_array().unwrap();
    // a large flow jump with a tiny acceleration should be split into
    // multiple discretization steps rather than emitted as one path.
    assert!(paths.len() > 1);
}

#[tokio::test]
async fn modify_against_unconfigured_extruder_is_rejected() {
    let port = spawn_test_server();
    let base = format!("http://127.0.0.1:{port}");
    let client = reqwest::Client::new();

    let modify_body = json!({
        "gcode_paths": [{
            "points": [{"x": 0, "y": 0}, {"x": 0, "y": 1000}],
            "flow": 1.0,
            "width_factor": 1.0,
            "line_width": 400.0,
            "layer_thickness": 250.0,
            "flow_ratio": 1.0,
            "speed_factor": 1.0,
            "speed_back_pressure_factor": 1.0,
            "retract": false,
            "speed_derivatives": {"velocity": 100.0}
        }],
        "extruder_nr": 7,
        "layer_nr": 0
    });

    let resp = client
        .post(format!("{base}/plugin/gradual-flow/v0/modify"))
        .json(&modify_body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn status_endpoint_reports_counters() {
    let port = spawn_test_server();
    let base = format!("http://127.0.0.1:{port}");
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/plugin/gradual-flow/v0/status"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["configured_extruders"], 0);
}
