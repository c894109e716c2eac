//! Telemetry sinks.
//!
//! Every sink is non-blocking: a sink that cannot accept a snapshot drops
//! it and counts the drop.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use asserv_common::consts::TELEMETRY_CHANNEL_SIZE;
use asserv_common::hal::driver::TelemetrySink;
use asserv_common::motion::types::TelemetrySnapshot;
use heapless::HistoryBuffer;
use heapless::spsc::{Consumer, Producer, Queue};
use tracing::info;

use crate::command::channel::SharedStats;

/// Telemetry channel queue type.
pub type TelemetryQueue = Queue<TelemetrySnapshot, TELEMETRY_CHANNEL_SIZE>;
/// Drain end of the telemetry channel.
pub type TelemetryConsumer<'a> = Consumer<'a, TelemetrySnapshot, TELEMETRY_CHANNEL_SIZE>;

// ─── Null ───────────────────────────────────────────────────────────

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    #[inline]
    fn publish(&mut self, _snapshot: &TelemetrySnapshot) -> bool {
        true
    }
}

// ─── Memory ─────────────────────────────────────────────────────────

/// Keeps the last `N` snapshots.
pub struct MemoryTelemetry<const N: usize> {
    history: HistoryBuffer<TelemetrySnapshot, N>,
    published: u64,
}

impl<const N: usize> MemoryTelemetry<N> {
    pub fn new() -> Self {
        Self {
            history: HistoryBuffer::new(),
            published: 0,
        }
    }

    /// Most recent snapshot.
    pub fn last(&self) -> Option<&TelemetrySnapshot> {
        self.history.recent()
    }

    /// Retained snapshots, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySnapshot> {
        self.history.oldest_ordered()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.len() == 0
    }

    /// Snapshots ever published, including evicted ones.
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl<const N: usize> Default for MemoryTelemetry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TelemetrySink for MemoryTelemetry<N> {
    #[inline]
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> bool {
        self.history.write(*snapshot);
        self.published += 1;
        true
    }
}

// ─── Log ────────────────────────────────────────────────────────────

/// Emits one `info!` line every `every` snapshots.
#[derive(Debug)]
pub struct LogTelemetry {
    every: u64,
    seen: u64,
}

impl LogTelemetry {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }
}

impl TelemetrySink for LogTelemetry {
    fn publish(&mut self, s: &TelemetrySnapshot) -> bool {
        self.seen += 1;
        if self.seen % self.every == 0 {
            info!(
                cycle = s.cycle,
                x = s.pose.x_mm,
                y = s.pose.y_mm,
                theta = s.pose.theta_rad,
                state = ?s.command_state,
                queue = s.queue_len,
                right_cmd = s.right.output,
                left_cmd = s.left.output,
                status = ?s.status,
                "telemetry"
            );
        }
        true
    }
}

// ─── Stream ─────────────────────────────────────────────────────────

/// Producer end of the telemetry SPSC channel.
pub struct StreamTelemetry<'a> {
    producer: Producer<'a, TelemetrySnapshot, TELEMETRY_CHANNEL_SIZE>,
    dropped: u64,
    stats: Option<Arc<SharedStats>>,
}

impl<'a> StreamTelemetry<'a> {
    pub fn new(producer: Producer<'a, TelemetrySnapshot, TELEMETRY_CHANNEL_SIZE>) -> Self {
        Self {
            producer,
            dropped: 0,
            stats: None,
        }
    }

    /// Also count drops in the shared loop statistics.
    pub fn with_stats(mut self, stats: Arc<SharedStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl TelemetrySink for StreamTelemetry<'_> {
    #[inline]
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> bool {
        if self.producer.enqueue(*snapshot).is_ok() {
            return true;
        }
        self.dropped += 1;
        if let Some(stats) = &self.stats {
            stats.dropped_telemetry.fetch_add(1, Ordering::Relaxed);
        }
        false
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
