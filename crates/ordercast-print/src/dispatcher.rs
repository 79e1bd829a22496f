// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ordered transport fallback for receipt printing.
//
// Transports are tried strictly one after another, cheapest first, and the
// first success ends the job. Attempts never run in parallel: a struggling
// printer gets one connection at a time. Each attempt carries its own
// timeout, so a job is bounded by (transports x attempt timeout).
//
// Per job: Pending -> Trying(0) -> { Succeeded | Trying(1) } -> ... -> AllFailed
//
// There is no automatic retry of a whole job; printing again is a caller
// decision.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use ordercast_core::config::PrintConfig;
use ordercast_core::error::Result;
use ordercast_core::types::{Order, PrintJob, PrintOutcome, PrinterAddress, TransportAttemptResult};

use crate::control_client::ControlServiceClient;
use crate::receipt::ReceiptFormatter;
use crate::transport::{PayloadKind, PrinterTransport, RawSocketTransport, build_chain};

/// Where a job is in its fallback walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Pending,
    Trying(usize),
    Succeeded(usize),
    AllFailed,
}

/// Receives every finished print job. Persisting is the implementor's call.
pub trait PrintLogSink: Send + Sync {
    fn record(&self, job: &PrintJob, outcome: &PrintOutcome);
}

/// Writes outcomes to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl PrintLogSink for TracingLogSink {
    fn record(&self, job: &PrintJob, outcome: &PrintOutcome) {
        let initiated_by = job.initiated_by.as_deref().unwrap_or("-");
        let initiated_from = job.initiated_from.as_deref().unwrap_or("-");
        if outcome.success {
            info!(
                order_id = %outcome.order_id,
                printer = %outcome.printer_ip,
                transport = outcome.transport.as_deref().unwrap_or("-"),
                attempts = outcome.attempts.len(),
                initiated_by,
                initiated_from,
                "receipt printed"
            );
        } else {
            warn!(
                order_id = %outcome.order_id,
                printer = %outcome.printer_ip,
                summary = %outcome.summary,
                initiated_by,
                initiated_from,
                "receipt could not be printed"
            );
        }
    }
}

/// Runs a print job across the configured transports.
pub struct PrintDispatcher {
    transports: Vec<Arc<dyn PrinterTransport>>,
    formatter: ReceiptFormatter,
    attempt_timeout: Duration,
    sink: Arc<dyn PrintLogSink>,
}

impl PrintDispatcher {
    pub fn new(
        transports: Vec<Arc<dyn PrinterTransport>>,
        formatter: ReceiptFormatter,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            transports,
            formatter,
            attempt_timeout,
            sink: Arc::new(TracingLogSink),
        }
    }

    /// Build the configured transport chain and formatter.
    pub fn from_config(config: &PrintConfig) -> Result<Self> {
        let client = ControlServiceClient::new(config.accept_invalid_certs)?;
        let transports = build_chain(&config.transports, &client);
        info!(
            chain = %transports.iter().map(|t| t.label()).collect::<Vec<_>>().join(" -> "),
            timeout_ms = config.attempt_timeout_ms,
            accept_invalid_certs = config.accept_invalid_certs,
            "print dispatcher ready"
        );
        Ok(Self::new(
            transports,
            ReceiptFormatter::from_config(config),
            config.attempt_timeout(),
        ))
    }

    pub fn with_sink(mut self, sink: Arc<dyn PrintLogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn formatter(&self) -> &ReceiptFormatter {
        &self.formatter
    }

    /// Labels of the base chain, in order.
    pub fn transport_labels(&self) -> Vec<String> {
        self.transports.iter().map(|t| t.label()).collect()
    }

    /// Print `order` on the printer at `printer`.
    pub async fn print_receipt(&self, order: &Order, printer: PrinterAddress) -> PrintOutcome {
        self.print_job(&PrintJob {
            order: order.clone(),
            printer,
            initiated_by: None,
            initiated_from: None,
        })
        .await
    }

    /// Print a job and hand the outcome to the log sink.
    #[instrument(skip(self, job), fields(order_id = %job.order.id, printer = %job.printer.ip))]
    pub async fn print_job(&self, job: &PrintJob) -> PrintOutcome {
        let chain = self.chain_for(job.printer);
        let attempts = self.run_chain(&chain, &job.order, job.printer.ip).await;
        let outcome = PrintOutcome::from_attempts(&job.order.id, job.printer.ip, attempts);
        self.sink.record(job, &outcome);
        outcome
    }

    /// The base chain, with a raw attempt on the caller's port hint put
    /// first when that port is not already covered.
    fn chain_for(&self, printer: PrinterAddress) -> Vec<Arc<dyn PrinterTransport>> {
        let mut chain = self.transports.clone();
        if let Some(port) = printer.port {
            let hinted = RawSocketTransport::new(port);
            let label = hinted.label();
            let covered = chain.iter().any(|t| t.label().ends_with(&format!(":{port}")));
            if !covered {
                debug!(transport = %label, "adding caller's printer port to the front of the chain");
                chain.insert(0, Arc::new(hinted));
            }
        }
        chain
    }

    async fn run_chain(
        &self,
        chain: &[Arc<dyn PrinterTransport>],
        order: &Order,
        ip: IpAddr,
    ) -> Vec<TransportAttemptResult> {
        let mut raw: Option<String> = None;
        let mut xml: Option<String> = None;
        let mut attempts = Vec::with_capacity(chain.len());
        let mut state = DispatchState::Pending;

        for (i, transport) in chain.iter().enumerate() {
            state = transition(state, DispatchState::Trying(i));
            let payload = match transport.payload_kind() {
                PayloadKind::RawText => raw.get_or_insert_with(|| self.formatter.format_raw(order)),
                PayloadKind::ControlXml => xml.get_or_insert_with(|| self.formatter.format_control_xml(order)),
            };

            let result = transport.attempt(ip, payload, self.attempt_timeout).await;
            if result.success {
                info!(
                    transport = %result.transport,
                    elapsed_ms = result.elapsed_ms,
                    "print transport succeeded"
                );
                attempts.push(result);
                transition(state, DispatchState::Succeeded(i));
                return attempts;
            }

            warn!(
                transport = %result.transport,
                error = result.error.as_deref().unwrap_or("unknown"),
                elapsed_ms = result.elapsed_ms,
                "print transport failed, trying next"
            );
            attempts.push(result);
        }

        transition(state, DispatchState::AllFailed);
        attempts
    }
}

fn transition(from: DispatchState, to: DispatchState) -> DispatchState {
    debug!(?from, ?to, "dispatch state");
    to
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use ordercast_core::types::TransportErrorKind;

    use super::*;

    /// Transport whose outcome is fixed up front; records every call.
    struct Scripted {
        label: &'static str,
        kind: PayloadKind,
        succeed: bool,
        calls: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl PrinterTransport for Scripted {
        fn label(&self) -> String {
            self.label.to_string()
        }

        fn payload_kind(&self) -> PayloadKind {
            self.kind
        }

        async fn attempt(&self, _ip: IpAddr, payload: &str, _timeout: Duration) -> TransportAttemptResult {
            self.calls
                .lock()
                .unwrap()
                .push((self.label.to_string(), payload.to_string()));
            if self.succeed {
                TransportAttemptResult::succeeded(self.label, None, 1)
            } else {
                TransportAttemptResult::failed(
                    self.label,
                    TransportErrorKind::ConnectionRefused,
                    format!("{} refused", self.label),
                    None,
                    1,
                )
            }
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<PrintOutcome>>);

    impl PrintLogSink for CollectingSink {
        fn record(&self, _job: &PrintJob, outcome: &PrintOutcome) {
            self.0.lock().unwrap().push(outcome.clone());
        }
    }

    type Calls = Arc<Mutex<Vec<(String, String)>>>;

    fn dispatcher(script: &[(&'static str, PayloadKind, bool)]) -> (PrintDispatcher, Calls) {
        let calls: Calls = Arc::default();
        let transports = script
            .iter()
            .map(|&(label, kind, succeed)| -> Arc<dyn PrinterTransport> {
                Arc::new(Scripted {
                    label,
                    kind,
                    succeed,
                    calls: Arc::clone(&calls),
                })
            })
            .collect();
        (
            PrintDispatcher::new(transports, ReceiptFormatter::default(), Duration::from_secs(1)),
            calls,
        )
    }

    fn order() -> Order {
        serde_json::from_value(serde_json::json!({
            "id": "ord-9",
            "location": "siteA",
            "customer_name": "Grace",
            "items": [{ "name": "Espresso", "quantity": 1, "price": 2.5 }],
            "total_amount": 2.5
        }))
        .unwrap()
    }

    fn printer() -> PrinterAddress {
        PrinterAddress::parse("192.168.1.77", None).unwrap()
    }

    #[tokio::test]
    async fn falls_back_in_order_until_success() {
        let (d, calls) = dispatcher(&[
            ("A", PayloadKind::RawText, false),
            ("B", PayloadKind::ControlXml, false),
            ("C", PayloadKind::ControlXml, true),
        ]);

        let outcome = d.print_receipt(&order(), printer()).await;

        assert!(outcome.success);
        assert_eq!(outcome.transport.as_deref(), Some("C"));
        let tried: Vec<&str> = outcome.attempts.iter().map(|a| a.transport.as_str()).collect();
        assert_eq!(tried, ["A", "B", "C"]);
        assert_eq!(outcome.failed_transports(), ["A", "B"]);
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let (d, calls) = dispatcher(&[
            ("A", PayloadKind::RawText, true),
            ("B", PayloadKind::ControlXml, true),
        ]);
        let outcome = d.print_receipt(&order(), printer()).await;
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn all_failures_are_aggregated() {
        let (d, _) = dispatcher(&[
            ("TCP:9100", PayloadKind::RawText, false),
            ("HTTP:80", PayloadKind::ControlXml, false),
            ("HTTPS:443", PayloadKind::ControlXml, false),
        ]);
        let sink = Arc::new(CollectingSink::default());
        let d = d.with_sink(sink.clone());

        let outcome = d.print_receipt(&order(), printer()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.transport, None);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.attempts.iter().all(|a| a.error.is_some()));
        assert_eq!(
            outcome.summary,
            "TCP:9100 connection refused; HTTP:80 connection refused; HTTPS:443 connection refused"
        );
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn each_transport_gets_its_own_payload_format() {
        let (d, calls) = dispatcher(&[
            ("raw", PayloadKind::RawText, false),
            ("xml", PayloadKind::ControlXml, false),
        ]);
        d.print_receipt(&order(), printer()).await;

        let calls = calls.lock().unwrap();
        assert!(calls[0].1.starts_with("\x1b@"));
        assert!(calls[1].1.starts_with("<?xml"));
        assert!(calls[1].1.contains("1 x Espresso - 2.50"));
    }

    #[test]
    fn port_hint_outside_chain_goes_first() {
        let (d, _) = dispatcher(&[("TCP:9100", PayloadKind::RawText, false)]);
        let hinted = PrinterAddress::parse("192.168.1.77", Some(9101)).unwrap();
        let labels: Vec<String> = d.chain_for(hinted).iter().map(|t| t.label()).collect();
        assert_eq!(labels, ["TCP:9101", "TCP:9100"]);

        let covered = PrinterAddress::parse("192.168.1.77", Some(9100)).unwrap();
        assert_eq!(d.chain_for(covered).len(), 1);
    }

    #[tokio::test]
    async fn empty_chain_reports_failure() {
        let (d, _) = dispatcher(&[]);
        let outcome = d.print_receipt(&order(), printer()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.summary, "no transports configured");
    }
}
