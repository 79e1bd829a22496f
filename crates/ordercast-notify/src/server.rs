// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Notification server lifecycle: bind, serve, graceful stop.
//
// The server carries the HTTP event endpoints, the print endpoint, and the
// terminal WebSocket on one port. `stop` stops accepting new connections,
// tells every open terminal session to close, and waits for in-flight HTTP
// requests and terminal sessions to finish.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use ordercast_core::error::{OrdercastError, Result};

use crate::routes::router;
use crate::state::AppState;

/// Lifecycle state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Stopped,
    Running,
}

pub struct NotificationServer {
    bind: SocketAddr,
    state: AppState,
    status: ServerStatus,
    local_addr: Option<SocketAddr>,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
}

impl NotificationServer {
    /// Create a server in `Stopped` state. Port 0 picks an ephemeral port.
    pub fn new(bind: SocketAddr, state: AppState) -> Self {
        Self {
            bind,
            state,
            status: ServerStatus::Stopped,
            local_addr: None,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Address actually bound, once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind the listener and start serving in a background task.
    ///
    /// # Errors
    ///
    /// Returns `Server` if the address cannot be bound.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let (ServerStatus::Running, Some(addr)) = (self.status, self.local_addr) {
            debug!(addr = %addr, "notification server already running");
            return Ok(addr);
        }

        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|e| OrdercastError::Server(format!("bind {}: {e}", self.bind)))?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, "notification server listening");

        self.state.open_terminals();
        let app = router(self.state.clone());
        let shutdown = Arc::clone(&self.shutdown_signal);
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "notification server exited with error");
            }
        });

        self.task_handle = Some(handle);
        self.local_addr = Some(addr);
        self.status = ServerStatus::Running;
        Ok(addr)
    }

    /// Signal shutdown and wait for the serve task to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }
        info!("stopping notification server");
        self.state.close_terminals();
        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| OrdercastError::Server(format!("task join: {e}")))?;
        }

        // Each session gets one write timeout for its close frame, plus slack.
        let drain = self.state.terminal.write_timeout * 2 + Duration::from_millis(250);
        if tokio::time::timeout(drain, self.state.terminals_closed()).await.is_err() {
            warn!(
                remaining = self.state.registry.registered(),
                "terminal sessions still open after shutdown"
            );
        }

        self.status = ServerStatus::Stopped;
        self.local_addr = None;
        info!("notification server stopped");
        Ok(())
    }

    /// Wait until the serve task ends on its own (it only does on error).
    pub async fn wait(&mut self) -> Result<()> {
        if let Some(handle) = self.task_handle.as_mut() {
            handle
                .await
                .map_err(|e| OrdercastError::Server(format!("task join: {e}")))?;
            self.task_handle = None;
            self.status = ServerStatus::Stopped;
        }
        Ok(())
    }
}
