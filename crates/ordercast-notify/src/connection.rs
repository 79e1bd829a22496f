// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sending half of one terminal connection.
//
// Each socket gets a bounded queue drained by its own writer task. Everyone
// else (the broadcaster, the read loop) only ever `try_send`s into it, so a
// stalled terminal can fill its own queue but never blocks a broadcast.
//
// Once a handle is marked closing, new items are refused and the queue stops
// yielding frames: a broadcaster holding a stale member snapshot cannot get
// anything onto the wire after the session has started to close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use ordercast_core::types::ConnectionId;

/// Work item for a terminal's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON text frame.
    Text(String),
    /// A WebSocket-level ping.
    Ping,
    /// Send a close frame and stop.
    Close,
}

/// Result of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The terminal's queue is at capacity; this item was dropped for it.
    Full,
    /// The writer task has gone away, or the session is closing.
    Closed,
}

/// Cheap, cloneable reference to a terminal's outbound queue.
#[derive(Debug, Clone)]
pub struct TerminalHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    closing: Arc<AtomicBool>,
}

/// Receiving half, owned by the writer task.
#[derive(Debug)]
pub struct TerminalQueue {
    rx: mpsc::Receiver<Outbound>,
    closing: Arc<AtomicBool>,
}

impl TerminalHandle {
    /// Create a handle and the queue its writer task will drain.
    pub fn channel(depth: usize) -> (Self, TerminalQueue) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let closing = Arc::new(AtomicBool::new(false));
        (
            Self {
                id: ConnectionId::new(),
                tx,
                closing: Arc::clone(&closing),
            },
            TerminalQueue { rx, closing },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn try_deliver(&self, item: Outbound) -> Delivery {
        if self.is_closing() {
            return Delivery::Closed;
        }
        self.send(item)
    }

    /// Mark the session closing and queue the close frame.
    ///
    /// Every later `try_deliver` on any clone returns `Closed`. A `Full`
    /// result means the close frame did not fit; the writer still stops
    /// emitting frames and closes the socket once the queue drains.
    pub fn close(&self) -> Delivery {
        self.closing.store(true, Ordering::SeqCst);
        self.send(Outbound::Close)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the writer task has dropped its queue.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    fn send(&self, item: Outbound) -> Delivery {
        match self.tx.try_send(item) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

impl TerminalQueue {
    /// Next item to write. After `close`, queued text and pings are
    /// discarded and only `Close` comes through.
    pub async fn recv(&mut self) -> Option<Outbound> {
        loop {
            let item = self.rx.recv().await?;
            if let Some(item) = self.admit(item) {
                return Some(item);
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<Outbound, TryRecvError> {
        loop {
            let item = self.rx.try_recv()?;
            if let Some(item) = self.admit(item) {
                return Ok(item);
            }
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn admit(&self, item: Outbound) -> Option<Outbound> {
        match item {
            Outbound::Close => Some(Outbound::Close),
            _ if self.is_closing() => None,
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_reports_full_then_closed() {
        let (handle, mut queue) = TerminalHandle::channel(1);
        assert_eq!(handle.try_deliver(Outbound::Text("a".into())), Delivery::Queued);
        assert_eq!(handle.try_deliver(Outbound::Text("b".into())), Delivery::Full);
        assert_eq!(queue.recv().await, Some(Outbound::Text("a".into())));

        drop(queue);
        assert!(handle.is_closed());
        assert_eq!(handle.try_deliver(Outbound::Ping), Delivery::Closed);
        handle.closed().await;
    }

    #[tokio::test]
    async fn closing_discards_pending_frames_and_refuses_new_ones() {
        let (handle, mut queue) = TerminalHandle::channel(8);
        let stale = handle.clone();
        assert_eq!(stale.try_deliver(Outbound::Text("before".into())), Delivery::Queued);

        assert_eq!(handle.close(), Delivery::Queued);
        assert!(stale.is_closing());
        assert_eq!(stale.try_deliver(Outbound::Text("after".into())), Delivery::Closed);
        assert_eq!(stale.try_deliver(Outbound::Ping), Delivery::Closed);

        assert_eq!(queue.recv().await, Some(Outbound::Close));
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_on_a_full_queue_still_stops_frames() {
        let (handle, mut queue) = TerminalHandle::channel(1);
        assert_eq!(handle.try_deliver(Outbound::Text("a".into())), Delivery::Queued);
        assert_eq!(handle.close(), Delivery::Full);

        drop(handle);
        assert!(queue.is_closing());
        assert_eq!(queue.recv().await, None);
    }

    #[test]
    fn handles_get_distinct_ids() {
        let (a, _qa) = TerminalHandle::channel(4);
        let (b, _qb) = TerminalHandle::channel(4);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }
}
