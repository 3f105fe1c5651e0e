//! RPC Transport
//!
//! Exposes the limiter over HTTP, standing in for the original plugin's gRPC
//! transport (`SPEC_FULL.md` §4.6) — the teacher's ambient stack has no gRPC
//! dependency, but does have `actix-web`/`actix-web-actors`, so the modify,
//! broadcast, and status surfaces are plain JSON endpoints and the status
//! stream is a WebSocket actor, built the same way as
//! `klipper-host::api::{printer_status, send_gcode, WebSocketSession}`.

use crate::adapter::{process_batch, ClientId};
use crate::config;
use crate::errors::LimiterError;
use crate::state::{AppState, StatusSnapshot};
use crate::wire::{BroadcastRequest, ModifyRequest, ModifyResponse};
use actix::prelude::*;
use actix_web::{get, post, web, App, Error, HttpRequest, HttpResponse, HttpServer, Responder};
use actix_web_actors::ws;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header clients may set to identify themselves explicitly; falls back to
/// the peer socket address when absent (`SPEC_FULL.md` §3).
const CLIENT_ID_HEADER: &str = "x-gradual-flow-client-id";

fn client_id_from_request(req: &HttpRequest) -> ClientId {
    if let Some(header) = req.headers().get(CLIENT_ID_HEADER) {
        if let Ok(text) = header.to_str() {
            if let Ok(parsed) = text.parse::<u64>() {
                return ClientId(parsed);
            }
        }
    }
    let peer: SocketAddr = req
        .peer_addr()
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in peer.to_string().as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    ClientId(hash)
}

fn error_response(err: LimiterError) -> HttpResponse {
    error!("request failed: {err}");
    let status = match err {
        LimiterError::ConfigIncomplete { .. } => actix_web::http::StatusCode::BAD_REQUEST,
        _ => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(json!({ "error": err.to_string() }))
}

/// `POST /plugin/gradual-flow/v0/modify`
#[post("/plugin/gradual-flow/v0/modify")]
async fn modify(
    req: HttpRequest,
    body: web::Json<ModifyRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    data.counters.modify_requests.fetch_add(1, Ordering::Relaxed);
    let client = client_id_from_request(&req);
    let body = body.into_inner();

    let settings = match data.extruder_settings(body.extruder_nr) {
        Some(settings) => settings,
        None => {
            data.counters.modify_failures.fetch_add(1, Ordering::Relaxed);
            return error_response(LimiterError::ConfigIncomplete {
                extruder: body.extruder_nr as usize,
                detail: "extruder has never been configured via broadcast".to_string(),
            });
        }
    };

    let trailing_key = (client, body.extruder_nr);
    let trailing_flow = if settings.continuity_enabled {
        data.trailing_flow.lock().get(&trailing_key).copied()
    } else {
        None
    };

    match process_batch(
        client,
        body.extruder_nr,
        body.layer_nr,
        &body.gcode_paths,
        &settings,
        trailing_flow,
    ) {
        Ok((gcode_paths, new_trailing)) => {
            if let Some(flow) = new_trailing {
                data.trailing_flow.lock().insert(trailing_key, flow);
            }
            HttpResponse::Ok().json(ModifyResponse { gcode_paths })
        }
        Err(e) => {
            data.counters.modify_failures.fetch_add(1, Ordering::Relaxed);
            error_response(e)
        }
    }
}

/// `POST /plugin/gradual-flow/v0/broadcast`
#[post("/plugin/gradual-flow/v0/broadcast")]
async fn broadcast(body: web::Json<BroadcastRequest>, data: web::Data<AppState>) -> impl Responder {
    data.counters.broadcast_requests.fetch_add(1, Ordering::Relaxed);
    match config::parse_all(&body.extruder_settings) {
        Ok(parsed) => {
            info!("accepted broadcast for {} extruder(s)", parsed.len());
            *data.settings.write() = parsed;
            HttpResponse::Ok().json(json!({ "status": "ok" }))
        }
        Err(e) => error_response(e),
    }
}

/// `GET /plugin/gradual-flow/v0/status`
#[get("/plugin/gradual-flow/v0/status")]
async fn status(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.snapshot())
}

/// A single WebSocket client subscribed to the status stream.
struct StatusSession {
    hb: Instant,
    app_state: web::Data<AppState>,
    last_payload: String,
}

impl Actor for StatusSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        self.push_status(ctx);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for StatusSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}

impl StatusSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("status WebSocket client heartbeat failed, disconnecting!");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
            act.push_status(ctx);
        });
    }

    fn push_status(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let snapshot: StatusSnapshot = self.app_state.snapshot();
        if let Ok(payload) = serde_json::to_string(&snapshot) {
            if payload != self.last_payload {
                ctx.text(payload.clone());
                self.last_payload = payload;
            }
        }
    }
}

async fn status_ws(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(
        StatusSession {
            hb: Instant::now(),
            app_state: data,
            last_payload: String::new(),
        },
        &req,
        stream,
    )
}

/// Starts the Actix web server bound to `address`.
pub fn start_server(
    address: &str,
    port: u16,
    app_state: Arc<AppState>,
) -> std::io::Result<actix_web::dev::Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(app_state.clone()))
            .service(modify)
            .service(broadcast)
            .service(status)
            .route("/ws", web::get().to(status_ws))
    })
    .bind((address, port))?
    .run();
    Ok(server)
}
