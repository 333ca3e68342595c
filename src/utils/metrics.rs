//! Observability and Metrics
//!
//! This module provides metrics collection for monitoring link health and
//! buffer pool pressure.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Global metrics collector for link operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections opened
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Total messages sent
    pub messages_sent: AtomicU64,
    /// Total messages delivered to a data handler
    pub messages_received: AtomicU64,
    /// Total payload bytes sent
    pub bytes_sent: AtomicU64,
    /// Total payload bytes delivered
    pub bytes_received: AtomicU64,
    /// Notify sends confirmed delivered
    pub notify_delivered: AtomicU64,
    /// Notify sends reported lost
    pub notify_lost: AtomicU64,
    /// Reliable packets sent again
    pub retransmissions: AtomicU64,
    /// Buffers allocated by any pool
    pub buffers_allocated: AtomicU64,
    /// Buffers freed because their pool was full
    pub buffers_discarded: AtomicU64,
    /// Malformed packets dropped
    pub invalid_packets: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            notify_delivered: AtomicU64::new(0),
            notify_lost: AtomicU64::new(0),
            retransmissions: AtomicU64::new(0),
            buffers_allocated: AtomicU64::new(0),
            buffers_discarded: AtomicU64::new(0),
            invalid_packets: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        // Saturate instead of wrapping if closes outnumber opens
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Record a message sent
    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a message handed to a data handler
    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn notify_delivered(&self) {
        self.notify_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notify_lost(&self) {
        self.notify_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retransmission(&self) {
        self.retransmissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn buffer_allocated(&self) {
        self.buffers_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn buffer_discarded(&self) {
        self.buffers_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_packet(&self) {
        self.invalid_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            notify_delivered: self.notify_delivered.load(Ordering::Relaxed),
            notify_lost: self.notify_lost.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            buffers_allocated: self.buffers_allocated.load(Ordering::Relaxed),
            buffers_discarded: self.buffers_discarded.load(Ordering::Relaxed),
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            messages_sent = snapshot.messages_sent,
            messages_received = snapshot.messages_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            notify_delivered = snapshot.notify_delivered,
            notify_lost = snapshot.notify_lost,
            retransmissions = snapshot.retransmissions,
            buffers_allocated = snapshot.buffers_allocated,
            buffers_discarded = snapshot.buffers_discarded,
            invalid_packets = snapshot.invalid_packets,
            uptime_seconds = snapshot.uptime_seconds,
            "Link metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub notify_delivered: u64,
    pub notify_lost: u64,
    pub retransmissions: u64,
    pub buffers_allocated: u64,
    pub buffers_discarded: u64,
    pub invalid_packets: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance (lazy static for simplicity)
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}
