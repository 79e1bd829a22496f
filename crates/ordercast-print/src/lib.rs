// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ordercast Print -- receipt rendering and delivery to LAN thermal printers.
// A print job walks an ordered chain of (protocol, port) transports until one
// of them gets the receipt onto paper.

pub mod control_client;
pub mod dispatcher;
pub mod raw_client;
pub mod receipt;
pub mod transport;

pub use control_client::ControlServiceClient;
pub use dispatcher::{PrintDispatcher, PrintLogSink, TracingLogSink};
pub use receipt::ReceiptFormatter;
pub use transport::{ControlServiceTransport, PayloadKind, PrinterTransport, RawSocketTransport};
