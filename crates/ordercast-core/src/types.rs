// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Ordercast pipeline.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{OrdercastError, Result};

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// A restaurant site code that has been checked against the configured set.
///
/// Only [`LocationSet::parse`] hands these out, so holding a `Location` means
/// the code is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of location codes this process accepts.
#[derive(Debug, Clone)]
pub struct LocationSet {
    codes: Vec<String>,
}

impl LocationSet {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut codes: Vec<String> = codes
            .into_iter()
            .map(|c| c.into().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        codes.sort();
        codes.dedup();
        Self { codes }
    }

    /// Validate a raw code from the wire.
    pub fn parse(&self, raw: &str) -> Result<Location> {
        let code = raw.trim();
        if self.codes.iter().any(|c| c == code) {
            Ok(Location(code.to_string()))
        } else {
            Err(OrdercastError::InvalidLocation(raw.to_string()))
        }
    }

    /// Every configured location, in sorted order.
    pub fn all(&self) -> Vec<Location> {
        self.codes.iter().cloned().map(Location).collect()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Orders (consumed payloads, owned by the external data store)
// ---------------------------------------------------------------------------

/// An order as carried in event payloads and print requests.
///
/// The web backend is loose about types (ids may be numbers, prices may be
/// strings, optional text may be `null`), so deserialization is lenient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub order_number: Option<String>,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub location: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub customer_name: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub customer_phone: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub customer_email: String,
    #[serde(default, deserialize_with = "items_or_empty")]
    pub items: Vec<LineItem>,
    #[serde(default, alias = "total", deserialize_with = "lenient_f64")]
    pub total_amount: f64,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub delivery_method: String,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub notes: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Human-facing order number, falling back to the record id.
    pub fn display_number(&self) -> &str {
        self.order_number.as_deref().unwrap_or(&self.id)
    }
}

/// One ordered menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub name: String,
    #[serde(default = "default_quantity", deserialize_with = "lenient_u32")]
    pub quantity: u32,
    #[serde(default, alias = "unit_price", deserialize_with = "lenient_f64")]
    pub price: f64,
}

impl LineItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

fn default_quantity() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Print jobs
// ---------------------------------------------------------------------------

/// Where a receipt should go. `port` is a hint from the terminal's printer
/// settings; the dispatcher still walks its full transport chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterAddress {
    pub ip: IpAddr,
    pub port: Option<u16>,
}

impl PrinterAddress {
    pub fn parse(ip: &str, port: Option<u16>) -> Result<Self> {
        let ip = ip.trim().parse::<IpAddr>().map_err(|e| {
            OrdercastError::Validation(format!("printer_ip '{ip}' is not an IP address: {e}"))
        })?;
        Ok(Self { ip, port })
    }
}

/// A single print request: built per attempt, never persisted.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub order: Order,
    pub printer: PrinterAddress,
    pub initiated_by: Option<String>,
    pub initiated_from: Option<String>,
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

/// Wire protocol used to reach a printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// Plain text written straight to a socket (JetDirect style).
    #[serde(alias = "tcp")]
    Raw,
    /// ePOS-Print XML over plain HTTP.
    Http,
    /// ePOS-Print XML over HTTPS.
    Https,
}

impl TransportProtocol {
    /// Short tag used in transport labels.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Raw => "TCP",
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        }
    }
}

/// A (protocol, port) pair the dispatcher can try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportSpec {
    pub protocol: TransportProtocol,
    pub port: u16,
}

impl TransportSpec {
    pub const fn new(protocol: TransportProtocol, port: u16) -> Self {
        Self { protocol, port }
    }

    /// Label shown to operators, e.g. `TCP:9100`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.protocol.tag(), self.port)
    }

    /// Cheapest first: raw socket, then the web ports, then the alternates
    /// some firmware moves the control service to.
    pub fn default_chain() -> Vec<TransportSpec> {
        vec![
            TransportSpec::new(TransportProtocol::Raw, 9100),
            TransportSpec::new(TransportProtocol::Http, 80),
            TransportSpec::new(TransportProtocol::Https, 443),
            TransportSpec::new(TransportProtocol::Http, 8008),
            TransportSpec::new(TransportProtocol::Https, 8043),
        ]
    }
}

/// Coarse cause of a failed transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    ConnectionRefused,
    Certificate,
    HttpStatus,
    PrinterRejected,
    Io,
}

impl TransportErrorKind {
    /// Classify a socket error.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::Timeout,
            std::io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            _ => Self::Io,
        }
    }

    /// Classify an error message from an HTTP/TLS stack.
    pub fn from_detail(detail: &str) -> Self {
        let lower = detail.to_ascii_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout
        } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("handshake") {
            Self::Certificate
        } else if lower.contains("connection refused") {
            Self::ConnectionRefused
        } else {
            Self::Io
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection refused",
            Self::Certificate => "certificate error",
            Self::HttpStatus => "bad http status",
            Self::PrinterRejected => "printer rejected job",
            Self::Io => "i/o error",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one transport attempt. Failures are values, never panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportAttemptResult {
    pub transport: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TransportErrorKind>,
    pub elapsed_ms: u64,
}

impl TransportAttemptResult {
    pub fn succeeded(transport: impl Into<String>, response: Option<String>, elapsed_ms: u64) -> Self {
        Self {
            transport: transport.into(),
            success: true,
            response,
            error: None,
            error_kind: None,
            elapsed_ms,
        }
    }

    pub fn failed(
        transport: impl Into<String>,
        kind: TransportErrorKind,
        error: impl Into<String>,
        response: Option<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            transport: transport.into(),
            success: false,
            response,
            error: Some(error.into()),
            error_kind: Some(kind),
            elapsed_ms,
        }
    }

    /// `TCP:9100 timeout` style fragment for summaries.
    pub fn short_note(&self) -> String {
        match self.error_kind {
            Some(kind) => format!("{} {}", self.transport, kind),
            None if self.success => format!("{} ok", self.transport),
            None => format!("{} failed", self.transport),
        }
    }
}

/// Terminal state of a print job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintOutcome {
    pub success: bool,
    pub order_id: String,
    pub printer_ip: IpAddr,
    /// Transport that delivered the receipt, if any did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Every attempt in the order it was made.
    pub attempts: Vec<TransportAttemptResult>,
    pub summary: String,
}

impl PrintOutcome {
    pub fn from_attempts(order_id: &str, printer_ip: IpAddr, attempts: Vec<TransportAttemptResult>) -> Self {
        let winner = attempts.iter().find(|a| a.success).map(|a| a.transport.clone());
        let summary = match &winner {
            Some(t) => format!("printed via {t}"),
            None if attempts.is_empty() => "no transports configured".to_string(),
            None => attempts
                .iter()
                .map(TransportAttemptResult::short_note)
                .collect::<Vec<_>>()
                .join("; "),
        };
        Self {
            success: winner.is_some(),
            order_id: order_id.to_string(),
            printer_ip,
            transport: winner,
            attempts,
            summary,
        }
    }

    /// `Ok` when some transport delivered the receipt.
    pub fn ensure_printed(&self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(OrdercastError::AllTransportsFailed(self.summary.clone()))
        }
    }

    /// Labels of the attempts that failed, in order.
    pub fn failed_transports(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|a| !a.success)
            .map(|a| a.transport.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Terminal events
// ---------------------------------------------------------------------------

/// Events pushed to terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    NewOrder,
    NewBooking,
    OrderStatusUpdate,
    PrintEvent,
    PrintCommand,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewOrder => "new-order",
            Self::NewBooking => "new-booking",
            Self::OrderStatusUpdate => "order-status-update",
            Self::PrintEvent => "print-event",
            Self::PrintCommand => "print-command",
        }
    }

    /// Top-level payload fields that must be present and non-empty.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::NewOrder | Self::NewBooking => &["id"],
            Self::OrderStatusUpdate => &["orderId", "status"],
            Self::PrintEvent => &["order_id"],
            Self::PrintCommand => &["order"],
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one terminal socket, independent of what it registers as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Lenient deserializers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Text(s) => s.trim().parse().ok(),
            Self::Number(n) => n.as_f64(),
            Self::Bool(_) => None,
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Scalar::deserialize(d)?.into_text())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?
        .map(Scalar::into_text)
        .filter(|s| !s.trim().is_empty()))
}

fn text_or_empty<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?
        .map(Scalar::into_text)
        .unwrap_or_default())
}

fn items_or_empty<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<LineItem>, D::Error> {
    Ok(Option::<Vec<LineItem>>::deserialize(d)?.unwrap_or_default())
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?
        .and_then(|s| s.as_f64())
        .unwrap_or(0.0))
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    let value = Option::<Scalar>::deserialize(d)?.and_then(|s| s.as_f64());
    Ok(match value {
        Some(v) if v.is_finite() && v >= 0.0 => v.round().min(f64::from(u32::MAX)) as u32,
        _ => default_quantity(),
    })
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(d)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    // Postgres without zone, e.g. "2026-03-01 18:04:00" or with a 'T'.
    Ok(["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc()))
}
