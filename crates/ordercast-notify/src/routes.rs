// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP and WebSocket routes.

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ordercast_core::error::OrdercastError;
use ordercast_core::types::{EventType, Order, PrintJob, PrinterAddress};

use crate::broadcaster::BroadcastReceipt;
use crate::error::ApiError;
use crate::events;
use crate::state::AppState;
use crate::terminal::serve_terminal;

/// Reply to every `/send-*` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub location: String,
    pub connected_terminals: usize,
    pub message_id: String,
}

impl From<BroadcastReceipt> for SendResponse {
    fn from(receipt: BroadcastReceipt) -> Self {
        Self {
            success: true,
            location: receipt.location.to_string(),
            connected_terminals: receipt.connected_terminals,
            message_id: receipt.message_id,
        }
    }
}

/// Body of `/print-receipt`.
#[derive(Debug, Clone, Deserialize)]
pub struct PrintRequest {
    pub order: Order,
    pub printer_ip: String,
    #[serde(default)]
    pub printer_port: Option<u16>,
    #[serde(default)]
    pub initiated_by: Option<String>,
    #[serde(default)]
    pub initiated_from: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/send-order", post(send_order))
        .route("/send-booking", post(send_booking))
        .route("/send-status-update", post(send_status_update))
        .route("/send-print-event", post(send_print_event))
        .route("/send-print-command", post(send_print_command))
        .route("/print-receipt", post(print_receipt))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ws", get(terminal_socket))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

type JsonBody = Result<Json<Value>, JsonRejection>;

async fn send_order(State(state): State<AppState>, body: JsonBody) -> Result<Json<SendResponse>, ApiError> {
    send_event(&state, EventType::NewOrder, body)
}

async fn send_booking(State(state): State<AppState>, body: JsonBody) -> Result<Json<SendResponse>, ApiError> {
    send_event(&state, EventType::NewBooking, body)
}

async fn send_status_update(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<SendResponse>, ApiError> {
    send_event(&state, EventType::OrderStatusUpdate, body)
}

async fn send_print_event(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<SendResponse>, ApiError> {
    send_event(&state, EventType::PrintEvent, body)
}

async fn send_print_command(
    State(state): State<AppState>,
    body: JsonBody,
) -> Result<Json<SendResponse>, ApiError> {
    send_event(&state, EventType::PrintCommand, body)
}

fn send_event(state: &AppState, event: EventType, body: JsonBody) -> Result<Json<SendResponse>, ApiError> {
    let Json(payload) = body?;
    let location = events::target_location(event, &payload)?;
    if event == EventType::PrintCommand {
        check_printer_fields(&payload)?;
    }
    let receipt = state.broadcaster.broadcast(event, &location, payload)?;
    Ok(Json(receipt.into()))
}

/// A print command that names a printer must name a usable one; terminals
/// act on it verbatim.
fn check_printer_fields(payload: &Value) -> Result<(), OrdercastError> {
    if let Some(ip) = payload.get("printer_ip").and_then(Value::as_str) {
        let port = match payload.get("printer_port") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| OrdercastError::Validation(format!("printer_port {v} is not a port")))?,
            ),
        };
        PrinterAddress::parse(ip, port)?;
    }
    Ok(())
}

async fn print_receipt(
    State(state): State<AppState>,
    body: Result<Json<PrintRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(mut request) = body?;
    let location = state.registry.locations().parse(&request.order.location)?;
    let printer = PrinterAddress::parse(&request.printer_ip, request.printer_port)?;
    request.order.location = location.to_string();
    let job = PrintJob {
        order: request.order,
        printer,
        initiated_by: request.initiated_by,
        initiated_from: request.initiated_from,
    };

    let outcome = match tokio::time::timeout(state.print_timeout, state.dispatcher.print_job(&job)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            let ms = u64::try_from(state.print_timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(order_id = %job.order.id, printer = %printer.ip, timeout_ms = ms, "print request timed out");
            return Err(ApiError::PrintTimeout(ms));
        }
    };

    // Failed jobs still return the full outcome.
    let status = match outcome.ensure_printed() {
        Ok(()) => StatusCode::OK,
        Err(e) => ApiError::from(e).status(),
    };
    Ok((status, Json(outcome)).into_response())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime": state.stats.uptime_secs(),
        "timestamp": Utc::now().to_rfc3339(),
        "stats": state.stats.snapshot(),
        "locations": state.registry.counts(),
        "printTransports": state.dispatcher.transport_labels(),
        "memory": { "rssBytes": resident_bytes() },
    }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "stats": state.stats.snapshot(),
        "locations": state.registry.counts(),
        "terminals": state.registry.describe(),
    }))
}

async fn terminal_socket(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    info!(peer = %peer, "terminal socket upgrade");
    let shutdown = state.terminal_shutdown();
    ws.on_upgrade(move |socket| {
        serve_terminal(socket, peer, state.registry, state.stats, state.terminal, shutdown)
    })
}

#[cfg(target_os = "linux")]
fn resident_bytes() -> Option<u64> {
    procfs::process::Process::myself()
        .and_then(|p| p.status())
        .ok()
        .and_then(|s| s.vmrss)
        .map(|kb| kb * 1024)
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes() -> Option<u64> {
    None
}
