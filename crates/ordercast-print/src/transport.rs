// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer transports: one delivery attempt over one (protocol, port) pair.
//
// Every attempt returns a `TransportAttemptResult`. Errors from the socket or
// HTTP stack are converted here and never cross into the dispatcher loop.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument};

use ordercast_core::error::OrdercastError;
use ordercast_core::types::{TransportAttemptResult, TransportErrorKind, TransportProtocol, TransportSpec};

use crate::control_client::{ControlServiceClient, evaluate_response};
use crate::raw_client;

/// Which rendering of the receipt a transport sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// ESC/POS-style text.
    RawText,
    /// ePOS-Print XML.
    ControlXml,
}

/// One way of reaching a printer.
#[async_trait]
pub trait PrinterTransport: Send + Sync {
    /// Operator-facing name, e.g. `HTTPS:443`.
    fn label(&self) -> String;

    fn payload_kind(&self) -> PayloadKind;

    /// Deliver `payload` to the printer at `ip`, giving up after `timeout`.
    async fn attempt(&self, ip: IpAddr, payload: &str, timeout: Duration) -> TransportAttemptResult;
}

/// Plain socket delivery of the raw text receipt.
#[derive(Debug, Clone)]
pub struct RawSocketTransport {
    port: u16,
}

impl RawSocketTransport {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl PrinterTransport for RawSocketTransport {
    fn label(&self) -> String {
        TransportSpec::new(TransportProtocol::Raw, self.port).label()
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::RawText
    }

    #[instrument(skip(self, payload), fields(transport = %self.label()))]
    async fn attempt(&self, ip: IpAddr, payload: &str, timeout: Duration) -> TransportAttemptResult {
        let started = Instant::now();
        let addr = SocketAddr::new(ip, self.port);
        match raw_client::send_raw(addr, payload.as_bytes(), timeout).await {
            Ok(sent) => {
                debug!(sent, "raw socket attempt succeeded");
                TransportAttemptResult::succeeded(self.label(), None, elapsed_ms(started))
            }
            Err(e) => failure(self.label(), e, None, started),
        }
    }
}

/// ePOS-Print XML over HTTP or HTTPS.
#[derive(Debug, Clone)]
pub struct ControlServiceTransport {
    protocol: TransportProtocol,
    port: u16,
    client: ControlServiceClient,
}

impl ControlServiceTransport {
    pub fn new(protocol: TransportProtocol, port: u16, client: ControlServiceClient) -> Self {
        Self {
            protocol,
            port,
            client,
        }
    }
}

#[async_trait]
impl PrinterTransport for ControlServiceTransport {
    fn label(&self) -> String {
        TransportSpec::new(self.protocol, self.port).label()
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::ControlXml
    }

    #[instrument(skip(self, payload), fields(transport = %self.label()))]
    async fn attempt(&self, ip: IpAddr, payload: &str, timeout: Duration) -> TransportAttemptResult {
        let started = Instant::now();
        let label = self.label();
        let url = ControlServiceClient::service_url(self.protocol, SocketAddr::new(ip, self.port), timeout);

        let response = match self
            .client
            .post_xml(&url, payload.to_string(), timeout, &label)
            .await
        {
            Ok(r) => r,
            Err(e) => return failure(label, e, None, started),
        };

        match evaluate_response(&response) {
            Ok(()) => TransportAttemptResult::succeeded(label, Some(response.body), elapsed_ms(started)),
            Err((kind, detail)) => TransportAttemptResult::failed(
                label,
                kind,
                detail,
                Some(response.body),
                elapsed_ms(started),
            ),
        }
    }
}

/// Instantiate the configured chain, in order.
pub fn build_chain(specs: &[TransportSpec], client: &ControlServiceClient) -> Vec<Arc<dyn PrinterTransport>> {
    specs
        .iter()
        .map(|spec| -> Arc<dyn PrinterTransport> {
            match spec.protocol {
                TransportProtocol::Raw => Arc::new(RawSocketTransport::new(spec.port)),
                TransportProtocol::Http | TransportProtocol::Https => {
                    Arc::new(ControlServiceTransport::new(spec.protocol, spec.port, client.clone()))
                }
            }
        })
        .collect()
}

fn failure(
    label: String,
    err: OrdercastError,
    response: Option<String>,
    started: Instant,
) -> TransportAttemptResult {
    let (kind, detail) = match err {
        OrdercastError::Transport { kind, detail, .. } => (kind, detail),
        other => (TransportErrorKind::Io, other.to_string()),
    };
    TransportAttemptResult::failed(label, kind, detail, response, elapsed_ms(started))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
