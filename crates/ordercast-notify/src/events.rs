// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire frames exchanged with terminals and payload validation for pushed
// events.
//
// Every frame is a JSON text message of the form `{"event": name, "data": {...}}`.
// Pushed events additionally carry a `messageId`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use ordercast_core::error::{OrdercastError, Result};
use ordercast_core::types::EventType;

/// Client -> server: join a location.
pub const REGISTER_TERMINAL: &str = "register-terminal";
/// Client -> server: application-level liveness check.
pub const PING: &str = "ping";
/// Server -> client: registration accepted.
pub const REGISTRATION_CONFIRMED: &str = "registration-confirmed";
/// Server -> client: a request from this terminal was rejected.
pub const ERROR: &str = "error";
/// Server -> client: answer to `ping`.
pub const PONG: &str = "pong";

/// A frame as received from a terminal.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// `register-terminal` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTerminal {
    pub location: String,
    #[serde(default)]
    pub terminal_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerFrame<'a> {
    event: &'a str,
    data: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
}

/// Serialize a server -> client frame.
pub fn frame(event: &str, data: &Value) -> Result<String> {
    Ok(serde_json::to_string(&ServerFrame {
        event,
        data,
        message_id: None,
    })?)
}

/// Serialize a pushed event frame.
pub fn event_frame(event: EventType, data: &Value, message_id: &str) -> Result<String> {
    Ok(serde_json::to_string(&ServerFrame {
        event: event.as_str(),
        data,
        message_id: Some(message_id),
    })?)
}

/// `<event>-<unix millis>-<8 hex chars>`.
pub fn message_id(event: EventType) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", event.as_str(), Utc::now().timestamp_millis(), &suffix[..8])
}

/// Check that `payload` is an object carrying the fields `event` requires.
pub fn validate_payload(event: EventType, payload: &Value) -> Result<()> {
    let Some(object) = payload.as_object() else {
        return Err(OrdercastError::Validation(format!(
            "{event} payload must be a JSON object"
        )));
    };

    let missing: Vec<&str> = event
        .required_fields()
        .iter()
        .copied()
        .filter(|field| !is_present(object.get(*field)))
        .collect();
    if !missing.is_empty() {
        return Err(OrdercastError::Validation(format!(
            "{event} payload is missing required field(s): {}",
            missing.join(", ")
        )));
    }

    if event == EventType::PrintCommand {
        let order = object.get("order").and_then(Value::as_object).ok_or_else(|| {
            OrdercastError::Validation("print-command 'order' must be an object".into())
        })?;
        if !is_present(order.get("location")) {
            return Err(OrdercastError::Validation(
                "print-command payload is missing order.location".into(),
            ));
        }
    }
    Ok(())
}

/// The location an HTTP body targets. Print commands carry it inside the
/// order; everything else at the top level.
pub fn target_location(event: EventType, payload: &Value) -> Result<String> {
    let raw = match event {
        EventType::PrintCommand => payload.get("order").and_then(|o| o.get("location")),
        _ => payload.get("location"),
    };
    raw.and_then(scalar_text)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| OrdercastError::Validation(format!("{event} request is missing location")))
}

/// Insert the server timestamp into an object payload.
pub fn stamp(payload: &mut Map<String, Value>) {
    payload.insert("timestamp".into(), Value::String(Utc::now().to_rfc3339()));
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
