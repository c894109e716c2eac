//! Wheel speed PI controller.
//!
//! The raw speed goal is slewed through an acceleration limiter before the
//! error is formed. The integrator is clamped to `±max_integral` and only
//! returns to zero through [`SpeedController::reset_integral`].

use asserv_common::motion::config::SpeedControllerConfig;

use super::limiter::{AccelerationLimiter, SimpleAccelerationLimiter};

/// Construction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedControllerParams {
    pub kp: f64,
    pub ki: f64,
    /// Integrator clamp.
    pub max_integral: f64,
    /// Output saturation.
    pub max_output: f64,
    /// Loop frequency [Hz].
    pub frequency_hz: f64,
}

impl SpeedControllerParams {
    pub fn from_config(config: &SpeedControllerConfig, frequency_hz: f64) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            max_integral: config.max_integral,
            max_output: config.max_output,
            frequency_hz,
        }
    }
}

/// PI controller on one wheel's linear speed.
#[derive(Debug, Clone)]
pub struct SpeedController<L: AccelerationLimiter = SimpleAccelerationLimiter> {
    speed_goal: f64,
    limited_speed_goal: f64,
    integrated_output: f64,
    kp: f64,
    ki: f64,
    max_integral: f64,
    max_output: f64,
    period: f64,
    limiter: L,
}

impl<L: AccelerationLimiter> SpeedController<L> {
    pub fn new(params: SpeedControllerParams, limiter: L) -> Self {
        Self {
            speed_goal: 0.0,
            limited_speed_goal: 0.0,
            integrated_output: 0.0,
            kp: params.kp,
            ki: params.ki,
            max_integral: params.max_integral,
            max_output: params.max_output,
            period: 1.0 / params.frequency_hz,
            limiter,
        }
    }

    /// Store a raw speed goal; it is limited on the next `update`.
    #[inline]
    pub fn set_speed_goal(&mut self, speed: f64) {
        self.speed_goal = speed;
    }

    /// Run one PI step against the measured speed and return the bounded command.
    #[inline]
    pub fn update(&mut self, measured_speed: f64) -> f64 {
        self.limited_speed_goal = self.limiter.limit(
            self.period,
            self.speed_goal,
            self.limited_speed_goal,
            measured_speed,
        );

        let error = self.limited_speed_goal - measured_speed;
        self.integrated_output = (self.integrated_output + error * self.period)
            .clamp(-self.max_integral, self.max_integral);

        (self.kp * error + self.ki * self.integrated_output).clamp(-self.max_output, self.max_output)
    }

    /// Zero the integrator.
    #[inline]
    pub fn reset_integral(&mut self) {
        self.integrated_output = 0.0;
    }

    /// Drop the goal and its limited value to zero, and the integrator.
    ///
    /// Used when motors are re-enabled so the wheels restart from rest.
    pub fn reset(&mut self) {
        self.speed_goal = 0.0;
        self.limited_speed_goal = 0.0;
        self.integrated_output = 0.0;
    }

    pub fn set_gains(&mut self, kp: f64, ki: f64) {
        self.kp = kp;
        self.ki = ki;
    }

    pub fn set_max_acceleration(&mut self, max_acceleration: f64) {
        self.limiter.set_max_acceleration(max_acceleration);
    }

    pub fn speed_goal(&self) -> f64 {
        self.speed_goal
    }

    pub fn limited_speed_goal(&self) -> f64 {
        self.limited_speed_goal
    }

    pub fn integrated_output(&self) -> f64 {
        self.integrated_output
    }

    pub fn gains(&self) -> (f64, f64) {
        (self.kp, self.ki)
    }

    /// Output saturation.
    pub fn max_output(&self) -> f64 {
        self.max_output
    }

    pub fn limiter(&self) -> &L {
        &self.limiter
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
