// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw socket print client (JetDirect style, port 9100 by default).
//
// Open a TCP connection, write the receipt text, close. The printer gives no
// application-level acknowledgement, so a clean write + shutdown is the
// success signal.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use ordercast_core::error::{OrdercastError, Result};
use ordercast_core::types::TransportErrorKind;

/// Default raw socket port.
pub const RAW_PORT: u16 = 9100;

/// Write size per chunk; receipts are small, this mostly bounds log noise.
const CHUNK_SIZE: usize = 4096;

/// Send `payload` to `addr`, bounding connect + write + close by `timeout`.
///
/// Returns the number of bytes written.
pub async fn send_raw(addr: SocketAddr, payload: &[u8], timeout: Duration) -> Result<usize> {
    let label = format!("TCP:{}", addr.port());
    match tokio::time::timeout(timeout, write_all(addr, payload, &label)).await {
        Ok(result) => result,
        Err(_) => Err(OrdercastError::Transport {
            transport: label,
            kind: TransportErrorKind::Timeout,
            detail: format!("no completion within {}ms", timeout.as_millis()),
        }),
    }
}

async fn write_all(addr: SocketAddr, payload: &[u8], label: &str) -> Result<usize> {
    info!(addr = %addr, bytes = payload.len(), "connecting via raw socket");

    let io_err = |stage: &str, e: std::io::Error| OrdercastError::Transport {
        transport: label.to_string(),
        kind: TransportErrorKind::from_io(&e),
        detail: format!("{stage}: {e}"),
    };

    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| io_err("connect", e))?;

    let mut sent = 0;
    for chunk in payload.chunks(CHUNK_SIZE) {
        stream
            .write_all(chunk)
            .await
            .map_err(|e| io_err(&format!("write at byte {sent}"), e))?;
        sent += chunk.len();
        debug!(sent, total = payload.len(), "raw socket progress");
    }

    stream.flush().await.map_err(|e| io_err("flush", e))?;
    stream.shutdown().await.map_err(|e| io_err("shutdown", e))?;

    info!(addr = %addr, bytes = sent, "raw socket receipt sent");
    Ok(sent)
}
