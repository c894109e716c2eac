//! Core data types exchanged between the control loop, its collaborators
//! and the command interface.

use core::f64::consts::PI;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// ─── Geometry ───────────────────────────────────────────────────────

/// Robot pose in the odometry frame.
///
/// `theta_rad` is an unbounded accumulator; use [`wrap_angle`] when a value
/// in `(-π, π]` is required.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// X position [mm].
    pub x_mm: f64,
    /// Y position [mm].
    pub y_mm: f64,
    /// Heading [rad], counter-clockwise positive.
    pub theta_rad: f64,
}

impl Pose {
    pub const fn new(x_mm: f64, y_mm: f64, theta_rad: f64) -> Self {
        Self {
            x_mm,
            y_mm,
            theta_rad,
        }
    }

    /// Euclidean distance to a point [mm].
    #[inline]
    pub fn distance_to(&self, x_mm: f64, y_mm: f64) -> f64 {
        (x_mm - self.x_mm).hypot(y_mm - self.y_mm)
    }

    /// Absolute bearing from this pose to a point [rad].
    #[inline]
    pub fn bearing_to(&self, x_mm: f64, y_mm: f64) -> f64 {
        (y_mm - self.y_mm).atan2(x_mm - self.x_mm)
    }
}

/// Wrap an angle into `(-π, π]`.
#[inline]
pub fn wrap_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

// ─── Encoders / motors ──────────────────────────────────────────────

/// Signed encoder tick deltas since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncoderDelta {
    pub right: i16,
    pub left: i16,
}

impl EncoderDelta {
    pub const fn new(right: i16, left: i16) -> Self {
        Self { right, left }
    }
}

/// Wheel side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Right,
    Left,
}

// ─── Trajectory ─────────────────────────────────────────────────────

/// A queued motion goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Waypoint {
    /// Drive straight by a signed distance [mm].
    StraightLine { distance_mm: f64 },
    /// Rotate in place by a signed angle [rad].
    Turn { angle_rad: f64 },
    /// Drive to a point and stop there.
    GoTo { x_mm: f64, y_mm: f64 },
    /// Drive through a point, blending into the next waypoint.
    GoToNoStop { x_mm: f64, y_mm: f64 },
    /// Turn in place to face a point.
    GoToAngle { x_mm: f64, y_mm: f64 },
}

impl Waypoint {
    /// Target point for point-based waypoints.
    pub const fn target(&self) -> Option<(f64, f64)> {
        match *self {
            Self::GoTo { x_mm, y_mm }
            | Self::GoToNoStop { x_mm, y_mm }
            | Self::GoToAngle { x_mm, y_mm } => Some((x_mm, y_mm)),
            Self::StraightLine { .. } | Self::Turn { .. } => None,
        }
    }

    /// Whether a no-stop waypoint may blend into this one.
    pub const fn is_translation_target(&self) -> bool {
        matches!(self, Self::GoTo { .. } | Self::GoToNoStop { .. })
    }
}

/// Current phase of the trajectory sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandState {
    /// No active segment; regulators hold their last goals.
    #[default]
    Idle = 0,
    /// Heading-only goal active.
    Turning = 1,
    /// Distance-only goal active.
    Moving = 2,
    /// Point tracking with full stop on arrival.
    GoToTracking = 3,
    /// Point tracking with early hand-off to the next waypoint.
    GoToNoStopTracking = 4,
    /// Heading alignment toward a point.
    GoToAngleAligning = 5,
}

// ─── Status & telemetry ─────────────────────────────────────────────

bitflags! {
    /// Per-cycle status word published with telemetry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AsservStatus: u16 {
        /// Motor output is administratively enabled.
        const MOTORS_ENABLED    = 0x0001;
        /// Angle/distance commands drive the wheel speed goals.
        const POLAR_ENABLED     = 0x0002;
        /// Sequencer has no active segment.
        const IDLE              = 0x0004;
        /// The previous cycle missed its deadline.
        const OVERRUN           = 0x0008;
        /// A waypoint was rejected because the queue was full.
        const QUEUE_OVERFLOW    = 0x0010;
        /// Regulators are bypassed by a direct speed test request.
        const DIRECT_SPEED_MODE = 0x0020;
    }
}

/// Values for one wheel in a telemetry snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelTelemetry {
    /// Raw speed goal [mm/s].
    pub speed_goal: f64,
    /// Acceleration-limited speed goal [mm/s].
    pub limited_speed_goal: f64,
    /// Estimated wheel speed [mm/s].
    pub estimated_speed: f64,
    /// Motor command actually sent [%].
    pub output: f64,
    /// Speed controller integrator.
    pub integrated_output: f64,
}

/// Intermediate values of one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Cycle counter.
    pub cycle: u64,
    /// Estimated pose.
    pub pose: Pose,
    /// Angle regulator goal [rad].
    pub angle_goal: f64,
    /// Angle regulator accumulator [rad].
    pub angle_accumulator: f64,
    /// Angle command after acceleration limiting [mm/s].
    pub angle_output: f64,
    /// Distance regulator goal [mm].
    pub distance_goal: f64,
    /// Distance regulator accumulator [mm].
    pub distance_accumulator: f64,
    /// Distance command after acceleration limiting [mm/s].
    pub distance_output: f64,
    pub right: WheelTelemetry,
    pub left: WheelTelemetry,
    /// Sequencer phase.
    pub command_state: CommandState,
    /// Waypoints waiting in the queue.
    pub queue_len: u8,
    /// Status flags.
    pub status: AsservStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_angle_range() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(-3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(2.0 * PI + 0.1) - 0.1).abs() < 1e-12);
        assert!((wrap_angle(-PI / 2.0) + PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn pose_bearing_and_distance() {
        let pose = Pose::new(100.0, 100.0, 0.0);
        assert!((pose.distance_to(400.0, 500.0) - 500.0).abs() < 1e-9);
        assert!((pose.bearing_to(100.0, 200.0) - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn waypoint_targets() {
        assert_eq!(Waypoint::Turn { angle_rad: 1.0 }.target(), None);
        assert_eq!(
            Waypoint::GoToAngle {
                x_mm: 1.0,
                y_mm: 2.0
            }
            .target(),
            Some((1.0, 2.0))
        );
        assert!(Waypoint::GoTo { x_mm: 0.0, y_mm: 0.0 }.is_translation_target());
        assert!(!Waypoint::GoToAngle { x_mm: 0.0, y_mm: 0.0 }.is_translation_target());
    }

    #[test]
    fn snapshot_serializes_status_flags() {
        let snap = TelemetrySnapshot {
            status: AsservStatus::MOTORS_ENABLED | AsservStatus::IDLE,
            ..Default::default()
        };
        assert!(snap.status.contains(AsservStatus::IDLE));
        assert!(!snap.status.contains(AsservStatus::OVERRUN));
    }
}
