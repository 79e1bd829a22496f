// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared state handed to every request handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use ordercast_core::config::OrdercastConfig;
use ordercast_core::error::Result;
use ordercast_print::PrintDispatcher;

use crate::broadcaster::NotificationBroadcaster;
use crate::registry::TerminalRegistry;
use crate::stats::ConnectionStats;
use crate::terminal::TerminalSettings;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TerminalRegistry>,
    pub stats: Arc<ConnectionStats>,
    pub broadcaster: NotificationBroadcaster,
    pub dispatcher: Arc<PrintDispatcher>,
    pub terminal: TerminalSettings,
    /// Outer deadline for `/print-receipt`.
    pub print_timeout: Duration,
    /// Raised on server stop; every open terminal session watches it.
    terminal_shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(
        registry: Arc<TerminalRegistry>,
        dispatcher: Arc<PrintDispatcher>,
        terminal: TerminalSettings,
        print_timeout: Duration,
    ) -> Self {
        let stats = Arc::new(ConnectionStats::new());
        Self {
            broadcaster: NotificationBroadcaster::new(registry.clone(), stats.clone()),
            registry,
            stats,
            dispatcher,
            terminal,
            print_timeout,
            terminal_shutdown: Arc::new(watch::channel(false).0),
        }
    }

    /// Shutdown flag for one terminal session.
    pub fn terminal_shutdown(&self) -> watch::Receiver<bool> {
        self.terminal_shutdown.subscribe()
    }

    /// Let terminal sessions run again after a stop.
    pub(crate) fn open_terminals(&self) {
        self.terminal_shutdown.send_replace(false);
    }

    /// Ask every open terminal session to close.
    pub fn close_terminals(&self) {
        self.terminal_shutdown.send_replace(true);
    }

    /// Resolves once no terminal session is left running.
    pub async fn terminals_closed(&self) {
        self.terminal_shutdown.closed().await;
    }

    /// Wire up registry, broadcaster, and print dispatcher from config.
    pub fn from_config(config: &OrdercastConfig) -> Result<Self> {
        let registry = Arc::new(TerminalRegistry::new(config.location_set()));
        let dispatcher = Arc::new(PrintDispatcher::from_config(&config.print)?);
        Ok(Self::new(
            registry,
            dispatcher,
            TerminalSettings::from_config(&config.server),
            config.print.request_timeout(),
        ))
    }
}
