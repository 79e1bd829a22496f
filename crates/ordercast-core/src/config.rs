// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process configuration: JSON file, then environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{OrdercastError, Result};
use crate::types::{LocationSet, TransportSpec};

/// Top-level settings for the notification server and print pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdercastConfig {
    pub server: ServerConfig,
    /// Restaurant site codes terminals and events may use.
    pub locations: Vec<String>,
    pub print: PrintConfig,
}

/// Notification server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind: String,
    /// HTTP + WebSocket port.
    pub port: u16,
    /// How often the server pings each terminal.
    pub ping_interval_secs: u64,
    /// Silence after which a terminal is dropped.
    pub idle_timeout_secs: u64,
    /// Upper bound on a single socket write to one terminal.
    pub write_timeout_secs: u64,
    /// Events buffered per terminal before new ones are dropped for it.
    pub terminal_queue_depth: usize,
}

/// Receipt printing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    /// Transports tried in order for each job.
    pub transports: Vec<TransportSpec>,
    /// Per-attempt timeout.
    pub attempt_timeout_ms: u64,
    /// Outer deadline applied by the HTTP print endpoint.
    pub request_timeout_ms: u64,
    /// Accept self-signed certificates on the HTTPS control service.
    pub accept_invalid_certs: bool,
    /// First line of every receipt.
    pub shop_name: String,
    /// Last line of every receipt.
    pub footer: String,
    /// Characters per receipt line.
    pub line_width: usize,
}

impl Default for OrdercastConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            locations: vec!["siteA".into(), "siteB".into(), "siteC".into()],
            print: PrintConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3001,
            ping_interval_secs: 25,
            idle_timeout_secs: 60,
            write_timeout_secs: 5,
            terminal_queue_depth: 64,
        }
    }
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            transports: TransportSpec::default_chain(),
            attempt_timeout_ms: 8_000,
            request_timeout_ms: 45_000,
            accept_invalid_certs: true,
            shop_name: "ORDER RECEIPT".into(),
            footer: "Thank you for your order!".into(),
            line_width: 42,
        }
    }
}

impl ServerConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl PrintConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl OrdercastConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Apply `ORDERCAST_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("ORDERCAST_PORT") {
            match port.trim().parse() {
                Ok(p) => self.server.port = p,
                Err(e) => warn!(value = %port, error = %e, "ignoring ORDERCAST_PORT"),
            }
        }
        if let Some(bind) = lookup("ORDERCAST_BIND") {
            self.server.bind = bind.trim().to_string();
        }
        if let Some(list) = lookup("ORDERCAST_LOCATIONS") {
            self.locations = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(flag) = lookup("ORDERCAST_ACCEPT_INVALID_CERTS") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.print.accept_invalid_certs = true,
                "0" | "false" | "no" => self.print.accept_invalid_certs = false,
                other => warn!(value = other, "ignoring ORDERCAST_ACCEPT_INVALID_CERTS"),
            }
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.location_set().is_empty() {
            return Err(OrdercastError::Config("at least one location is required".into()));
        }
        if self.print.transports.is_empty() {
            return Err(OrdercastError::Config("print.transports must not be empty".into()));
        }
        if self.print.attempt_timeout_ms == 0 || self.print.request_timeout_ms == 0 {
            return Err(OrdercastError::Config("print timeouts must be non-zero".into()));
        }
        if self.server.ping_interval_secs == 0 || self.server.write_timeout_secs == 0 {
            return Err(OrdercastError::Config("server intervals must be non-zero".into()));
        }
        if self.server.idle_timeout_secs <= self.server.ping_interval_secs {
            return Err(OrdercastError::Config(format!(
                "idle_timeout_secs ({}) must exceed ping_interval_secs ({})",
                self.server.idle_timeout_secs, self.server.ping_interval_secs
            )));
        }
        if self.server.terminal_queue_depth == 0 {
            return Err(OrdercastError::Config("terminal_queue_depth must be non-zero".into()));
        }
        if self.print.line_width < 24 {
            return Err(OrdercastError::Config("print.line_width must be at least 24".into()));
        }
        Ok(())
    }

    pub fn location_set(&self) -> LocationSet {
        LocationSet::new(self.locations.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::types::TransportProtocol;

    #[test]
    fn defaults_are_valid() {
        let config = OrdercastConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.print.attempt_timeout(), Duration::from_secs(8));
        assert!(config.print.accept_invalid_certs);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "locations": ["harbour"], "print": {{ "transports": [{{"protocol": "https", "port": 443}}] }} }}"#
        )
        .expect("write");

        let config = OrdercastConfig::from_file(file.path()).expect("load");
        assert_eq!(config.locations, ["harbour"]);
        assert_eq!(config.print.transports.len(), 1);
        assert_eq!(config.print.transports[0].protocol, TransportProtocol::Https);
        assert_eq!(config.print.line_width, 42);
        assert_eq!(config.server.idle_timeout_secs, 60);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ORDERCAST_PORT", "4100"),
            ("ORDERCAST_LOCATIONS", "north, south,,"),
            ("ORDERCAST_ACCEPT_INVALID_CERTS", "false"),
        ]);
        let mut config = OrdercastConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 4100);
        assert_eq!(config.locations, ["north", "south"]);
        assert!(!config.print.accept_invalid_certs);
    }

    #[test]
    fn bad_port_override_is_ignored() {
        let mut config = OrdercastConfig::default();
        config.apply_overrides(|k| (k == "ORDERCAST_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn idle_timeout_must_exceed_ping_interval() {
        let mut config = OrdercastConfig::default();
        config.server.idle_timeout_secs = config.server.ping_interval_secs;
        assert!(matches!(config.validate(), Err(OrdercastError::Config(_))));
    }

    #[test]
    fn empty_locations_rejected() {
        let mut config = OrdercastConfig::default();
        config.locations = vec!["  ".into()];
        assert!(config.validate().is_err());
    }
}
