// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process-wide connection counters, reset only on restart.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters shared by the registry, broadcaster, and terminal handlers.
#[derive(Debug)]
pub struct ConnectionStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    messages_sent: AtomicU64,
    last_activity: Mutex<DateTime<Utc>>,
    started: Instant,
}

/// Point-in-time copy of [`ConnectionStats`], in the shape `/health` and
/// `/stats` report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub messages_sent: u64,
    pub last_activity: DateTime<Utc>,
    /// Seconds since the process started.
    pub uptime: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            last_activity: Mutex::new(Utc::now()),
            started: Instant::now(),
        }
    }

    pub fn record_connect(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn record_disconnect(&self) {
        // Saturate so a stray double call cannot wrap the gauge.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        self.touch();
    }

    /// One accepted broadcast, however many terminals it reached.
    pub fn record_broadcast(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            last_activity: *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()),
            uptime: self.uptime_secs(),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Utc::now();
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}
