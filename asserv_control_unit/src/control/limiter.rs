//! Setpoint slew-rate limiters.
//!
//! A limiter moves a setpoint from the previously emitted value toward a
//! target by at most `acceleration * dt`. The previous output is owned by
//! the caller, so limiters only hold their limits.
//!
//! - [`SimpleAccelerationLimiter`] uses one constant bound.
//! - [`AdvancedAccelerationLimiter`] uses a gentler bound while the measured
//!   speed is below a threshold (hard switch, no hysteresis).

use asserv_common::motion::config::RegulatorConfig;

/// Slew-rate limiting strategy.
pub trait AccelerationLimiter {
    /// Next setpoint, at most one acceleration step from `previous_output`.
    ///
    /// `current_measured` is the measured speed the bound may depend on.
    fn limit(&self, dt: f64, target: f64, previous_output: f64, current_measured: f64) -> f64;

    /// Change the (high-speed) acceleration bound [units/s²].
    fn set_max_acceleration(&mut self, max_acceleration: f64);

    /// Current (high-speed) acceleration bound.
    fn max_acceleration(&self) -> f64;
}

/// Move `previous` toward `target` by at most `max_step`; exact when reachable.
#[inline]
fn step_toward(target: f64, previous: f64, max_step: f64) -> f64 {
    let delta = target - previous;
    if delta.abs() <= max_step {
        target
    } else {
        previous + max_step.copysign(delta)
    }
}

// ─── Simple ─────────────────────────────────────────────────────────

/// Constant acceleration bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleAccelerationLimiter {
    max_acceleration: f64,
}

impl SimpleAccelerationLimiter {
    pub const fn new(max_acceleration: f64) -> Self {
        Self { max_acceleration }
    }
}

impl AccelerationLimiter for SimpleAccelerationLimiter {
    #[inline]
    fn limit(&self, dt: f64, target: f64, previous_output: f64, _current_measured: f64) -> f64 {
        step_toward(target, previous_output, self.max_acceleration * dt)
    }

    fn set_max_acceleration(&mut self, max_acceleration: f64) {
        self.max_acceleration = max_acceleration;
    }

    fn max_acceleration(&self) -> f64 {
        self.max_acceleration
    }
}

// ─── Advanced ───────────────────────────────────────────────────────

/// Speed-dependent acceleration bound.
///
/// `min_acceleration` applies while `|current_measured| < high_speed_threshold`,
/// `max_acceleration` otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvancedAccelerationLimiter {
    max_acceleration: f64,
    min_acceleration: f64,
    high_speed_threshold: f64,
}

impl AdvancedAccelerationLimiter {
    pub const fn new(max_acceleration: f64, min_acceleration: f64, high_speed_threshold: f64) -> Self {
        Self {
            max_acceleration,
            min_acceleration,
            high_speed_threshold,
        }
    }

    pub fn set_min_acceleration(&mut self, min_acceleration: f64) {
        self.min_acceleration = min_acceleration;
    }

    pub fn set_high_speed_threshold(&mut self, high_speed_threshold: f64) {
        self.high_speed_threshold = high_speed_threshold;
    }

    pub fn min_acceleration(&self) -> f64 {
        self.min_acceleration
    }

    pub fn high_speed_threshold(&self) -> f64 {
        self.high_speed_threshold
    }

    /// Bound in force at the given measured speed.
    #[inline]
    pub fn applicable_acceleration(&self, current_measured: f64) -> f64 {
        if current_measured.abs() < self.high_speed_threshold {
            self.min_acceleration
        } else {
            self.max_acceleration
        }
    }
}

impl AccelerationLimiter for AdvancedAccelerationLimiter {
    #[inline]
    fn limit(&self, dt: f64, target: f64, previous_output: f64, current_measured: f64) -> f64 {
        let acc = self.applicable_acceleration(current_measured);
        step_toward(target, previous_output, acc * dt)
    }

    fn set_max_acceleration(&mut self, max_acceleration: f64) {
        self.max_acceleration = max_acceleration;
    }

    fn max_acceleration(&self) -> f64 {
        self.max_acceleration
    }
}

// ─── Config-selected ────────────────────────────────────────────────

/// Limiter strategy picked from a regulator section at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandLimiter {
    Simple(SimpleAccelerationLimiter),
    Advanced(AdvancedAccelerationLimiter),
}

impl CommandLimiter {
    /// `Advanced` when the section declares a low-speed regime.
    pub fn from_config(config: &RegulatorConfig) -> Self {
        match config.low_speed {
            Some(low) => Self::Advanced(AdvancedAccelerationLimiter::new(
                config.max_acceleration,
                low.min_acceleration,
                low.high_speed_threshold,
            )),
            None => Self::Simple(SimpleAccelerationLimiter::new(config.max_acceleration)),
        }
    }
}

impl AccelerationLimiter for CommandLimiter {
    #[inline]
    fn limit(&self, dt: f64, target: f64, previous_output: f64, current_measured: f64) -> f64 {
        match self {
            Self::Simple(l) => l.limit(dt, target, previous_output, current_measured),
            Self::Advanced(l) => l.limit(dt, target, previous_output, current_measured),
        }
    }

    fn set_max_acceleration(&mut self, max_acceleration: f64) {
        match self {
            Self::Simple(l) => l.set_max_acceleration(max_acceleration),
            Self::Advanced(l) => l.set_max_acceleration(max_acceleration),
        }
    }

    fn max_acceleration(&self) -> f64 {
        match self {
            Self::Simple(l) => l.max_acceleration(),
            Self::Advanced(l) => l.max_acceleration(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
