// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-location event fan-out.
//
// `broadcast` never awaits a socket: it enqueues one frame on each member's
// bounded queue and moves on. A full or closed queue costs that terminal the
// event and nothing else.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use ordercast_core::error::Result;
use ordercast_core::types::{EventType, Location};

use crate::connection::{Delivery, Outbound};
use crate::events;
use crate::registry::TerminalRegistry;
use crate::stats::ConnectionStats;

/// What a broadcast reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReceipt {
    pub message_id: String,
    pub location: Location,
    /// Members of the location at the time of the broadcast.
    pub connected_terminals: usize,
    /// Members whose queue accepted the frame.
    pub delivered: usize,
}

/// Validates events and pushes them to a location's terminals.
#[derive(Debug, Clone)]
pub struct NotificationBroadcaster {
    registry: Arc<TerminalRegistry>,
    stats: Arc<ConnectionStats>,
}

impl NotificationBroadcaster {
    pub fn new(registry: Arc<TerminalRegistry>, stats: Arc<ConnectionStats>) -> Self {
        Self { registry, stats }
    }

    /// Validate `payload` for `event`, stamp it, and queue it for every
    /// terminal registered at `location`.
    ///
    /// Rejected input has no side effects. Zero connected terminals is not an
    /// error.
    #[instrument(skip(self, payload), fields(event = %event))]
    pub fn broadcast(&self, event: EventType, location: &str, mut payload: Value) -> Result<BroadcastReceipt> {
        let location = self.registry.locations().parse(location)?;
        events::validate_payload(event, &payload)?;

        let message_id = events::message_id(event);
        if let Some(object) = payload.as_object_mut() {
            events::stamp(object);
        }
        let text = events::event_frame(event, &payload, &message_id)?;

        let members = self.registry.members_of(&location);
        let mut delivered = 0;
        for member in &members {
            match member.try_deliver(Outbound::Text(text.clone())) {
                Delivery::Queued => delivered += 1,
                Delivery::Full => warn!(
                    connection = %member.id(),
                    location = %location,
                    message_id = %message_id,
                    "terminal queue full, event dropped for it"
                ),
                Delivery::Closed => debug!(connection = %member.id(), "terminal closed during broadcast"),
            }
        }
        self.stats.record_broadcast();

        if members.is_empty() {
            warn!(location = %location, message_id = %message_id, "no terminals connected for location");
        } else {
            info!(
                location = %location,
                message_id = %message_id,
                connected = members.len(),
                delivered,
                "event broadcast"
            );
        }

        Ok(BroadcastReceipt {
            message_id,
            location,
            connected_terminals: members.len(),
            delivered,
        })
    }
}
