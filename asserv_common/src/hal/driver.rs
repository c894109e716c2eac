//! Collaborator traits and error types.
//!
//! This module defines:
//! - `EncoderSource` trait - Signed tick deltas, read-and-reset
//! - `MotorSink` trait - Per-wheel bounded motor command
//! - `TelemetrySink` trait - Non-blocking per-cycle snapshot publication
//! - `HalError` enum - Error types for collaborator lifecycle operations

use crate::motion::types::{EncoderDelta, Side, TelemetrySnapshot};
use thiserror::Error;

/// Error types for collaborator operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Collaborator initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),
}

/// Source of incremental encoder ticks.
///
/// # Lifecycle
///
/// 1. `start()` - Called once before the control loop starts
/// 2. `values_and_reset()` - Called once per cycle from the control loop
/// 3. `stop()` - Called when the control loop exits
///
/// # Timing Contracts
///
/// | Operation | Max Duration | RT Constraint |
/// |-----------|--------------|---------------|
/// | `start()` | unbounded | None (pre-RT) |
/// | `values_and_reset()` | bounded | **HARD** |
/// | `stop()` | unbounded | None (post-RT) |
pub trait EncoderSource: Send {
    /// Prepare the underlying counters.
    fn start(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    /// Signed deltas since the previous call, with per-wheel ratio and
    /// polarity already applied. The read and the clear are one step so
    /// that no tick is counted twice or lost.
    fn values_and_reset(&mut self) -> EncoderDelta;

    /// Release the underlying counters.
    fn stop(&mut self) -> Result<(), HalError> {
        Ok(())
    }
}

/// Consumer of per-wheel motor commands.
///
/// `set_motor_speed` is called from the control loop every cycle and must
/// not block. Units and scaling are the implementor's concern; the core
/// only guarantees the value lies within the configured output bound.
pub trait MotorSink: Send {
    /// Bring the driver to a state where commands are accepted.
    fn init(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    /// Apply a signed bounded command to one wheel.
    fn set_motor_speed(&mut self, side: Side, command: f64);

    /// Leave the motors in a safe state.
    fn shutdown(&mut self) -> Result<(), HalError> {
        self.set_motor_speed(Side::Right, 0.0);
        self.set_motor_speed(Side::Left, 0.0);
        Ok(())
    }
}

/// Consumer of per-cycle telemetry.
///
/// Publication is best-effort: an implementation that cannot keep up drops
/// snapshots and must never block the control loop.
pub trait TelemetrySink: Send {
    /// Publish one snapshot. Returns `false` when the snapshot was dropped.
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> bool;
}

impl<T: EncoderSource + ?Sized> EncoderSource for Box<T> {
    fn start(&mut self) -> Result<(), HalError> {
        (**self).start()
    }

    fn values_and_reset(&mut self) -> EncoderDelta {
        (**self).values_and_reset()
    }

    fn stop(&mut self) -> Result<(), HalError> {
        (**self).stop()
    }
}

impl<T: MotorSink + ?Sized> MotorSink for Box<T> {
    fn init(&mut self) -> Result<(), HalError> {
        (**self).init()
    }

    fn set_motor_speed(&mut self, side: Side, command: f64) {
        (**self).set_motor_speed(side, command)
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        (**self).shutdown()
    }
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Box<T> {
    fn publish(&mut self, snapshot: &TelemetrySnapshot) -> bool {
        (**self).publish(snapshot)
    }
}
