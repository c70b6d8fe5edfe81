//! Live connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::Relaxed};
use std::time::{Duration, Instant};

use courier_core::frames::OutboundFrame;
use courier_core::ids::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// One participant's transport channel.
///
/// Frames are handed to the socket's write task through a bounded channel;
/// pushing never waits on the network. Once the socket closes the channel
/// closes with it and every further send reports `false`.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the socket's write task.
    tx: mpsc::Sender<Arc<String>>,
    /// Upgrade time.
    pub opened_at: Instant,
    /// Set by inbound traffic, cleared by each heartbeat check.
    active: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped: AtomicU64,
}

impl ClientConnection {
    /// Wrap the sending half of a socket's outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            opened_at: now,
            active: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue an encoded frame without waiting.
    ///
    /// A full or closed queue drops the frame and reports `false`.
    pub fn send(&self, frame: Arc<String>) -> bool {
        let queued = self.tx.try_send(frame).is_ok();
        if !queued {
            let _ = self.dropped.fetch_add(1, Relaxed);
        }
        queued
    }

    /// Encode and enqueue a frame.
    pub fn send_frame(&self, frame: &OutboundFrame) -> bool {
        match frame.encode() {
            Ok(text) => self.send(Arc::new(text)),
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "failed to encode frame");
                false
            }
        }
    }

    /// Whether the write side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Frames dropped so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Relaxed)
    }

    /// Note inbound traffic from the peer.
    pub fn mark_alive(&self) {
        self.active.store(true, Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the peer last sent anything.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Whether the peer was heard from since the previous call.
    pub fn check_alive(&self) -> bool {
        self.active.swap(false, Relaxed)
    }

    /// Time since the upgrade.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
