//! Command thread → control thread plumbing.
//!
//! Two mechanisms, neither of which can block the control thread:
//! - [`ControlFlags`]: atomic enable flags, read once per cycle.
//! - [`ControlRequest`]s through a bounded SPSC queue, drained at the start
//!   of every cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use asserv_common::consts::{COMMAND_QUEUE_CAPACITY, CONTROL_CHANNEL_SIZE};
use asserv_common::motion::types::{Pose, Side, Waypoint};
use heapless::spsc::{Consumer, Producer, Queue};
use static_assertions::const_assert;

use super::CommandError;

// A full waypoint queue fits in one burst of requests.
const_assert!(CONTROL_CHANNEL_SIZE > COMMAND_QUEUE_CAPACITY);

/// Request channel queue type. Holds `CONTROL_CHANNEL_SIZE - 1` requests.
pub type RequestQueue = Queue<ControlRequest, CONTROL_CHANNEL_SIZE>;
/// Command-thread end of the request channel.
pub type RequestProducer<'a> = Producer<'a, ControlRequest, CONTROL_CHANNEL_SIZE>;
/// Control-thread end of the request channel.
pub type RequestConsumer<'a> = Consumer<'a, ControlRequest, CONTROL_CHANNEL_SIZE>;

/// One operation applied by the control thread at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlRequest {
    /// Append a waypoint to the sequencer queue.
    Waypoint(Waypoint),
    /// Zero both regulators, their goals and the pose.
    Reset,
    /// Drop queued and active segments, hold position, leave test modes.
    ResetToNormalMode,
    ResetAngleAccumulator,
    ResetDistanceAccumulator,
    /// Overwrite the odometry pose.
    SetPose(Pose),
    SetSpeedGains { side: Side, kp: f64, ki: f64 },
    SetAngleGain(f64),
    SetDistanceGain(f64),
    SetAngleAcceleration(f64),
    SetDistanceAcceleration(f64),
    SetPllBandwidth(f64),
    /// Drive wheel speed goals directly (polar control must be off).
    SetWheelsSpeed { right: f64, left: f64 },
    /// Drive distance/angle speed commands directly, bypassing the regulators.
    SetRegulatorsSpeed { distance: f64, angle: f64 },
    /// Raw motor command for one wheel, bypassing the speed loop.
    SetMotorSpeed { side: Side, command: f64 },
}

/// Administrative flags shared between the command and control threads.
#[derive(Debug)]
pub struct ControlFlags {
    motors_enabled: AtomicBool,
    polar_enabled: AtomicBool,
}

impl ControlFlags {
    pub const fn new(motors_enabled: bool, polar_enabled: bool) -> Self {
        Self {
            motors_enabled: AtomicBool::new(motors_enabled),
            polar_enabled: AtomicBool::new(polar_enabled),
        }
    }

    #[inline]
    pub fn motors_enabled(&self) -> bool {
        self.motors_enabled.load(Ordering::Acquire)
    }

    #[inline]
    pub fn polar_enabled(&self) -> bool {
        self.polar_enabled.load(Ordering::Acquire)
    }

    pub fn set_motors_enabled(&self, enabled: bool) {
        self.motors_enabled.store(enabled, Ordering::Release);
    }

    pub fn set_polar_enabled(&self, enabled: bool) {
        self.polar_enabled.store(enabled, Ordering::Release);
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::new(true, true)
    }
}

/// Loop statistics published by the control thread for the shell.
#[derive(Debug, Default)]
pub struct SharedStats {
    pub cycles: AtomicU64,
    pub overruns: AtomicU64,
    pub last_cycle_ns: AtomicU64,
    pub max_cycle_ns: AtomicU64,
    pub max_latency_ns: AtomicU64,
    pub dropped_requests: AtomicU64,
    pub dropped_telemetry: AtomicU64,
    /// Cumulative encoder ticks since start.
    pub right_ticks: AtomicI64,
    pub left_ticks: AtomicI64,
}

impl SharedStats {
    /// Plain copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            last_cycle_ns: self.last_cycle_ns.load(Ordering::Relaxed),
            max_cycle_ns: self.max_cycle_ns.load(Ordering::Relaxed),
            max_latency_ns: self.max_latency_ns.load(Ordering::Relaxed),
            dropped_requests: self.dropped_requests.load(Ordering::Relaxed),
            dropped_telemetry: self.dropped_telemetry.load(Ordering::Relaxed),
            right_ticks: self.right_ticks.load(Ordering::Relaxed),
            left_ticks: self.left_ticks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SharedStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub overruns: u64,
    pub last_cycle_ns: u64,
    pub max_cycle_ns: u64,
    pub max_latency_ns: u64,
    pub dropped_requests: u64,
    pub dropped_telemetry: u64,
    pub right_ticks: i64,
    pub left_ticks: i64,
}

/// Command-thread handle to a running control loop.
pub struct CommandHandle<'a> {
    producer: RequestProducer<'a>,
    flags: Arc<ControlFlags>,
    stats: Arc<SharedStats>,
}

impl<'a> CommandHandle<'a> {
    pub fn new(producer: RequestProducer<'a>, flags: Arc<ControlFlags>, stats: Arc<SharedStats>) -> Self {
        Self {
            producer,
            flags,
            stats,
        }
    }

    /// Enqueue a request. Never blocks.
    pub fn send(&mut self, request: ControlRequest) -> Result<(), CommandError> {
        self.producer.enqueue(request).map_err(|_| {
            self.stats.dropped_requests.fetch_add(1, Ordering::Relaxed);
            CommandError::ChannelFull
        })
    }

    pub fn enable_motors(&self, enabled: bool) {
        self.flags.set_motors_enabled(enabled);
    }

    pub fn enable_polar(&self, enabled: bool) {
        self.flags.set_polar_enabled(enabled);
    }

    pub fn add_waypoint(&mut self, waypoint: Waypoint) -> Result<(), CommandError> {
        self.send(ControlRequest::Waypoint(waypoint))
    }

    /// Direct wheel speed goals; refused while polar control is on.
    pub fn set_wheels_speed(&mut self, right: f64, left: f64) -> Result<(), CommandError> {
        if self.flags.polar_enabled() {
            return Err(CommandError::PolarEnabled);
        }
        self.send(ControlRequest::SetWheelsSpeed { right, left })
    }

    pub fn flags(&self) -> &ControlFlags {
        &self.flags
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip() {
        let flags = ControlFlags::new(false, true);
        assert!(!flags.motors_enabled());
        assert!(flags.polar_enabled());
        flags.set_motors_enabled(true);
        flags.set_polar_enabled(false);
        assert!(flags.motors_enabled());
        assert!(!flags.polar_enabled());
    }

    #[test]
    fn handle_reports_full_channel() {
        let mut queue: RequestQueue = Queue::new();
        let (producer, mut consumer) = queue.split();
        let stats = Arc::new(SharedStats::default());
        let mut handle = CommandHandle::new(producer, Arc::new(ControlFlags::default()), stats.clone());

        for _ in 0..CONTROL_CHANNEL_SIZE - 1 {
            handle.send(ControlRequest::Reset).unwrap();
        }
        assert_eq!(handle.send(ControlRequest::Reset), Err(CommandError::ChannelFull));
        assert_eq!(handle.stats().dropped_requests, 1);

        assert_eq!(consumer.dequeue(), Some(ControlRequest::Reset));
        assert!(handle.send(ControlRequest::Reset).is_ok());
    }

    #[test]
    fn wheel_speed_requires_polar_off() {
        let mut queue: RequestQueue = Queue::new();
        let (producer, mut consumer) = queue.split();
        let flags = Arc::new(ControlFlags::new(true, true));
        let mut handle = CommandHandle::new(producer, flags, Arc::new(SharedStats::default()));

        assert_eq!(handle.set_wheels_speed(100.0, 100.0), Err(CommandError::PolarEnabled));
        handle.enable_polar(false);
        handle.set_wheels_speed(100.0, -50.0).unwrap();
        assert_eq!(
            consumer.dequeue(),
            Some(ControlRequest::SetWheelsSpeed {
                right: 100.0,
                left: -50.0
            })
        );
    }
}
