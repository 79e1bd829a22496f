// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ordercast Notify -- real-time fan-out of order events to POS terminals.
// Terminals join a location over a WebSocket; the web backend posts events
// over HTTP and every terminal at the event's location receives them.

pub mod announce;
pub mod broadcaster;
pub mod connection;
pub mod error;
pub mod events;
pub mod registry;
pub mod routes;
pub mod server;
pub mod state;
pub mod stats;
pub mod terminal;

pub use announce::OrderAnnouncer;
pub use broadcaster::{BroadcastReceipt, NotificationBroadcaster};
pub use registry::TerminalRegistry;
pub use routes::{SendResponse, router};
pub use server::{NotificationServer, ServerStatus};
pub use state::AppState;
pub use stats::{ConnectionStats, StatsSnapshot};
pub use terminal::TerminalSettings;
