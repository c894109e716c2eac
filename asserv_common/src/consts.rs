//! System-wide constants for the asserv workspace.
//!
//! Single source of truth for default tuning values and validation bounds.
//! Defaults reproduce the reference robot (500 Hz loop, 264 mm wheelbase,
//! 1440-line quadrature encoders on 31.8 mm wheels).

use core::f64::consts::PI;

use static_assertions::const_assert;

// ─── Cycle ──────────────────────────────────────────────────────────

/// Default control loop frequency [Hz].
pub const LOOP_FREQUENCY_HZ: u32 = 500;
/// Accepted loop frequency range [Hz].
pub const LOOP_FREQUENCY_HZ_MIN: u32 = 50;
pub const LOOP_FREQUENCY_HZ_MAX: u32 = 5000;

/// Default number of speed-loop ticks per position-loop tick.
pub const POSITION_DIVISOR: u32 = 5;
/// Upper bound on the position divisor.
pub const POSITION_DIVISOR_MAX: u32 = 100;

/// Default telemetry decimation [cycles].
pub const TELEMETRY_INTERVAL: u32 = 1;

// ─── Robot geometry ─────────────────────────────────────────────────

/// Encoder wheel radius [mm].
pub const WHEEL_RADIUS_MM: f64 = 31.80 / 2.0;
/// Distance between the two encoder wheels [mm].
pub const WHEELBASE_MM: f64 = 264.0;
/// Encoder ticks per wheel revolution (quadrature, both edges).
pub const TICKS_PER_TURN: u32 = 1440 * 4;
/// Maximum commanded linear wheel speed [mm/s].
pub const MAX_SPEED_MM_PER_S: f64 = 1500.0;

// ─── Position regulators ────────────────────────────────────────────

/// Angle regulator gain [mm/s per rad].
pub const ANGLE_REGULATOR_KP: f64 = 650.0;
/// Angle command acceleration limit [mm/s²].
pub const ANGLE_REGULATOR_MAX_ACC: f64 = 3.0 * LOOP_FREQUENCY_HZ as f64;

/// Distance regulator gain [mm/s per mm].
pub const DISTANCE_REGULATOR_KP: f64 = 3.0;
/// Distance command acceleration limit above the low-speed threshold [mm/s²].
pub const DISTANCE_REGULATOR_MAX_ACC: f64 = 3.0 * LOOP_FREQUENCY_HZ as f64;
/// Distance command acceleration limit below the low-speed threshold [mm/s²].
pub const DISTANCE_REGULATOR_MIN_ACC: f64 = 1.0 * LOOP_FREQUENCY_HZ as f64;
/// Speed below which the gentler distance acceleration applies [mm/s].
pub const DISTANCE_REGULATOR_LOW_SPEED_THRESHOLD: f64 = 300.0;

// ─── Wheel speed controllers ────────────────────────────────────────

/// Speed controller proportional gain [% per mm/s].
pub const SPEED_CONTROLLER_KP: f64 = 0.2;
/// Speed controller integral gain [% per mm].
pub const SPEED_CONTROLLER_KI: f64 = 2.0;
/// Integrator clamp [mm].
pub const SPEED_CONTROLLER_MAX_INTEGRAL: f64 = 100.0;
/// Motor command saturation [%].
pub const SPEED_CONTROLLER_MAX_OUTPUT: f64 = 100.0;
/// Wheel speed goal acceleration limit [mm/s²].
pub const SPEED_CONTROLLER_MAX_ACC: f64 = 6000.0;

// ─── Estimator ──────────────────────────────────────────────────────

/// Default PLL bandwidth [rad/s].
pub const PLL_BANDWIDTH: f64 = 250.0;

// ─── Command manager ────────────────────────────────────────────────

/// Heading arrival threshold [rad].
pub const ARRIVAL_ANGLE_THRESHOLD_RAD: f64 = 0.02;
/// Distance arrival threshold [mm].
pub const ARRIVAL_DISTANCE_THRESHOLD_MM: f64 = 30.0;
/// Heading error above which a go-to turns in place first [rad].
pub const GOTO_ANGLE_THRESHOLD_RAD: f64 = PI / 8.0;
/// Distance goal that saturates the distance regulator at cruise speed [mm].
pub const GOTO_NOSTOP_FULLSPEED_DIST_MM: f64 = MAX_SPEED_MM_PER_S / DISTANCE_REGULATOR_KP;
/// Remaining distance at which the next no-stop waypoint is promoted [mm].
pub const GOTO_NOSTOP_MIN_NEXT_DIST_MM: f64 = 200.0;
/// Maximum corner angle that keeps cruise speed through a waypoint [rad].
pub const GOTO_NOSTOP_NEXT_ANGLE_THRESHOLD_RAD: f64 = PI / 8.0;

/// Waypoint FIFO capacity.
pub const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Control request channel size (SPSC, usable capacity is N - 1).
pub const CONTROL_CHANNEL_SIZE: usize = 64;
/// Telemetry channel size (SPSC, usable capacity is N - 1).
pub const TELEMETRY_CHANNEL_SIZE: usize = 256;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/asserv.toml";

const_assert!(POSITION_DIVISOR >= 1 && POSITION_DIVISOR <= POSITION_DIVISOR_MAX);
const_assert!(LOOP_FREQUENCY_HZ >= LOOP_FREQUENCY_HZ_MIN);
const_assert!(LOOP_FREQUENCY_HZ <= LOOP_FREQUENCY_HZ_MAX);
const_assert!(COMMAND_QUEUE_CAPACITY > 0);
const_assert!(CONTROL_CHANNEL_SIZE.is_power_of_two());
const_assert!(TELEMETRY_CHANNEL_SIZE.is_power_of_two());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_speed_distance_saturates_distance_regulator() {
        let output = DISTANCE_REGULATOR_KP * GOTO_NOSTOP_FULLSPEED_DIST_MM;
        assert!((output - MAX_SPEED_MM_PER_S).abs() < 1e-9);
    }

    #[test]
    fn low_speed_acceleration_is_gentler() {
        assert!(DISTANCE_REGULATOR_MIN_ACC < DISTANCE_REGULATOR_MAX_ACC);
    }

    #[test]
    fn promotion_happens_before_arrival() {
        assert!(GOTO_NOSTOP_MIN_NEXT_DIST_MM > ARRIVAL_DISTANCE_THRESHOLD_MM);
    }
}
