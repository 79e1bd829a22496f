// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client side of `/send-order`, used by the order confirmation path.
//
// Announcing is independent of printing: a failed announcement is reported
// to the caller and nothing is retried here.

use std::time::Duration;

use tracing::{info, warn};

use ordercast_core::error::{OrdercastError, Result};
use ordercast_core::types::Order;

use crate::routes::SendResponse;

/// Default bound on one announcement round trip.
pub const DEFAULT_ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct OrderAnnouncer {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl OrderAnnouncer {
    /// `base_url` is the notification server root, e.g. `http://127.0.0.1:3001`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| OrdercastError::Config(format!("build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/send-order", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Push a confirmed order to the terminals at its location.
    pub async fn announce(&self, order: &Order) -> Result<SendResponse> {
        if order.location.trim().is_empty() {
            return Err(OrdercastError::Validation(format!(
                "order {} has no location",
                order.id
            )));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(order)
            .send()
            .await
            .map_err(|e| OrdercastError::Announce(format!("POST {}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let reason = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("no error message")
                .to_string();
            warn!(order_id = %order.id, status = status.as_u16(), reason = %reason, "order announcement rejected");
            return Err(OrdercastError::Announce(format!("HTTP {}: {reason}", status.as_u16())));
        }

        let reply: SendResponse = response
            .json()
            .await
            .map_err(|e| OrdercastError::Announce(format!("unreadable reply: {e}")))?;
        info!(
            order_id = %order.id,
            location = %reply.location,
            connected = reply.connected_terminals,
            message_id = %reply.message_id,
            "order announced"
        );
        Ok(reply)
    }
}
