use serde::Serialize;
/// Hub metrics
///
/// Aggregate delivery statistics for one hub, exposed through `/status`.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Connections registered over the hub's lifetime
    total_connections: AtomicU64,
    active_connections: AtomicUsize,
    /// Frames queued onto a connection's outbound channel
    frames_sent: AtomicU64,
    /// Frames dropped because a connection's queue was full
    frames_dropped: AtomicU64,
    /// Connections removed during a send because their queue was closed
    connections_evicted: AtomicU64,
    /// Sends applied on behalf of another instance
    remote_sends: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn frames_sent(&self, count: u64) {
        self.frames_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn frames_dropped(&self, count: u64) {
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn connections_evicted(&self, count: u64) {
        self.connections_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn remote_send(&self) {
        self.remote_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
            remote_sends: self.remote_sends.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubMetricsSnapshot {
    pub total_connections: u64,
    pub active_connections: usize,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub connections_evicted: u64,
    pub remote_sends: u64,
}
