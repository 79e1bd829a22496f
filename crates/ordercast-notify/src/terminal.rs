// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One POS terminal's WebSocket session.
//
// The socket is split: a writer task drains the terminal's bounded queue,
// and the read loop below handles inbound frames, sends keepalive pings, and
// enforces the idle timeout. Every exit path marks the handle closing and
// then unregisters the connection before the handler returns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use ordercast_core::config::ServerConfig;

use crate::connection::{Delivery, Outbound, TerminalHandle, TerminalQueue};
use crate::events::{self, ClientFrame, RegisterTerminal};
use crate::registry::TerminalRegistry;
use crate::stats::ConnectionStats;

/// Timing and buffering for terminal sockets.
#[derive(Debug, Clone, Copy)]
pub struct TerminalSettings {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
    pub queue_depth: usize,
}

impl TerminalSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            idle_timeout: config.idle_timeout(),
            write_timeout: config.write_timeout(),
            queue_depth: config.terminal_queue_depth,
        }
    }
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    ClientClosed,
    Idle,
    SocketError,
    WriterGone,
    ServerShutdown,
}

/// Drive one terminal socket until it closes, goes idle, fails, or the
/// server shuts down.
pub async fn serve_terminal(
    socket: WebSocket,
    peer: SocketAddr,
    registry: Arc<TerminalRegistry>,
    stats: Arc<ConnectionStats>,
    settings: TerminalSettings,
    shutdown: watch::Receiver<bool>,
) {
    let (sink, mut stream) = socket.split();
    let (handle, queue) = TerminalHandle::channel(settings.queue_depth);
    let id = handle.id();
    let mut writer = tokio::spawn(write_loop(sink, queue, settings.write_timeout));

    stats.record_connect();
    info!(connection = %id, peer = %peer, "terminal connected");

    let mut ping = tokio::time::interval_at(Instant::now() + settings.ping_interval, settings.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();
    let shutdown = shutdown_requested(shutdown);
    tokio::pin!(shutdown);

    let exit = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                None | Some(Ok(Message::Close(_))) => break Exit::ClientClosed,
                Some(Err(e)) => {
                    debug!(connection = %id, error = %e, "terminal socket error");
                    break Exit::SocketError;
                }
                Some(Ok(message)) => {
                    last_seen = Instant::now();
                    if let Message::Text(text) = message {
                        on_text(&text, &handle, &registry);
                    }
                }
            },
            _ = ping.tick() => {
                if handle.try_deliver(Outbound::Ping) == Delivery::Closed {
                    break Exit::WriterGone;
                }
            }
            () = tokio::time::sleep_until(last_seen + settings.idle_timeout) => break Exit::Idle,
            () = handle.closed() => break Exit::WriterGone,
            () = &mut shutdown => break Exit::ServerShutdown,
        }
    };

    // Closing first: a broadcaster still holding this handle from an earlier
    // member snapshot gets `Closed` from here on.
    if handle.close() == Delivery::Full {
        debug!(connection = %id, "close frame did not fit in queue; writer will close after draining");
    }
    let location = registry.unregister(id);
    stats.record_disconnect();
    let location = location.as_ref().map(|l| l.as_str()).unwrap_or("-");
    match exit {
        Exit::Idle => warn!(
            connection = %id,
            location,
            idle_secs = settings.idle_timeout.as_secs(),
            "terminal idle, disconnecting"
        ),
        _ => info!(connection = %id, location, reason = ?exit, "terminal disconnected"),
    }

    drop(handle);
    if tokio::time::timeout(settings.write_timeout, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Resolves once the shutdown flag is raised. A dropped sender never fires.
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Handle one inbound text frame. Replies go through the terminal's own
/// queue so they are ordered with pushed events.
fn on_text(text: &str, handle: &TerminalHandle, registry: &TerminalRegistry) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            reply(handle, events::ERROR, &json!({ "message": format!("malformed frame: {e}") }));
            return;
        }
    };

    match frame.event.as_str() {
        events::REGISTER_TERMINAL => {
            let request: RegisterTerminal = match serde_json::from_value(frame.data) {
                Ok(r) => r,
                Err(e) => {
                    reply(
                        handle,
                        events::ERROR,
                        &json!({ "message": format!("invalid register-terminal: {e}") }),
                    );
                    return;
                }
            };
            match registry.register(handle, &request.location, request.terminal_id.clone()) {
                Ok((location, count)) => reply(
                    handle,
                    events::REGISTRATION_CONFIRMED,
                    &json!({
                        "location": location,
                        "terminalId": request.terminal_id,
                        "connectedTerminals": count,
                    }),
                ),
                Err(e) => {
                    warn!(connection = %handle.id(), location = %request.location, "registration rejected");
                    reply(handle, events::ERROR, &json!({ "message": e.to_string() }));
                }
            }
        }
        events::PING => reply(
            handle,
            events::PONG,
            &json!({ "timestamp": chrono::Utc::now().to_rfc3339() }),
        ),
        other => {
            debug!(connection = %handle.id(), event = other, "unknown terminal event");
            reply(handle, events::ERROR, &json!({ "message": format!("unknown event '{other}'") }));
        }
    }
}

fn reply(handle: &TerminalHandle, event: &str, data: &Value) {
    let text = match events::frame(event, data) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "could not encode reply");
            return;
        }
    };
    if handle.try_deliver(Outbound::Text(text)) == Delivery::Full {
        warn!(connection = %handle.id(), event, "terminal queue full, reply dropped");
    }
}

async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut queue: TerminalQueue, write_timeout: Duration) {
    while let Some(item) = queue.recv().await {
        let (message, last) = match item {
            Outbound::Text(text) => (Message::Text(text), false),
            Outbound::Ping => (Message::Ping(Vec::new()), false),
            Outbound::Close => (Message::Close(None), true),
        };
        if !send_within(&mut sink, message, write_timeout).await || last {
            return;
        }
    }
    // Every handle dropped without a queued close frame.
    if queue.is_closing() {
        send_within(&mut sink, Message::Close(None), write_timeout).await;
    }
}

async fn send_within(sink: &mut SplitSink<WebSocket, Message>, message: Message, write_timeout: Duration) -> bool {
    match tokio::time::timeout(write_timeout, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "terminal write failed");
            false
        }
        Err(_) => {
            warn!(timeout_ms = millis(write_timeout), "terminal write timed out");
            false
        }
    }
}
