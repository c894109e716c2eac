//! Simulated differential-drive plant.
//!
//! [`SimMotors`] stores the commanded duty of each wheel in lock-free
//! atomics. [`SimEncoders`] advances a first-order wheel model by one
//! control period on every read and returns the resulting tick deltas.
//! The simulated counters are wired with the configured ratio and
//! polarity, which the encoder source undoes exactly as a hardware source
//! would, so a correct configuration yields true wheel ticks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use asserv_common::hal::driver::{EncoderSource, HalError, MotorSink};
use asserv_common::motion::config::AsservConfig;
use asserv_common::motion::types::{EncoderDelta, Side};
use tracing::debug;

/// Commands shared between the motor sink and the plant.
#[derive(Debug, Default)]
struct SimShared {
    duty: [AtomicU64; 2],
}

impl SimShared {
    fn set(&self, side: Side, duty: f64) {
        self.duty[index(side)].store(duty.to_bits(), Ordering::Relaxed);
    }

    fn get(&self, side: Side) -> f64 {
        f64::from_bits(self.duty[index(side)].load(Ordering::Relaxed))
    }
}

#[inline]
const fn index(side: Side) -> usize {
    match side {
        Side::Right => 0,
        Side::Left => 1,
    }
}

/// Create a connected encoder source and motor sink.
pub fn sim_pair(config: &AsservConfig) -> (SimEncoders, SimMotors) {
    let shared = Arc::new(SimShared::default());
    let encoders = SimEncoders {
        shared: shared.clone(),
        wheels: [WheelModel::default(); 2],
        dt: config.period_s(),
        mm_per_tick: config.robot.mm_per_tick(),
        time_constant_s: config.sim.time_constant_s,
        max_wheel_speed: config.sim.max_wheel_speed_mm_s,
        max_duty: config.speed.right.max_output.max(config.speed.left.max_output),
        ratio: config.sim.encoder_ratio,
        inverted: config.sim.encoder_inverted,
    };
    (encoders, SimMotors { shared })
}

// ─── Motors ─────────────────────────────────────────────────────────

/// Motor sink writing into the simulated plant.
#[derive(Debug)]
pub struct SimMotors {
    shared: Arc<SimShared>,
}

impl SimMotors {
    /// Read-only view of the commands, usable after the sink is moved away.
    pub fn monitor(&self) -> SimMonitor {
        SimMonitor {
            shared: self.shared.clone(),
        }
    }
}

impl MotorSink for SimMotors {
    fn init(&mut self) -> Result<(), HalError> {
        self.shared.set(Side::Right, 0.0);
        self.shared.set(Side::Left, 0.0);
        debug!("simulated motors ready");
        Ok(())
    }

    #[inline]
    fn set_motor_speed(&mut self, side: Side, command: f64) {
        self.shared.set(side, command);
    }
}

/// Observer of the last motor commands.
#[derive(Debug, Clone)]
pub struct SimMonitor {
    shared: Arc<SimShared>,
}

impl SimMonitor {
    pub fn command(&self, side: Side) -> f64 {
        self.shared.get(side)
    }
}

// ─── Encoders ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct WheelModel {
    /// Wheel surface speed [mm/s].
    speed: f64,
    /// Raw counter position, fractional [ticks].
    raw_ticks: f64,
    /// Corrected count already reported [ticks].
    reported: i64,
}

/// Encoder source driven by the first-order wheel model.
#[derive(Debug)]
pub struct SimEncoders {
    shared: Arc<SimShared>,
    wheels: [WheelModel; 2],
    dt: f64,
    mm_per_tick: f64,
    time_constant_s: f64,
    max_wheel_speed: f64,
    max_duty: f64,
    ratio: [f64; 2],
    inverted: [bool; 2],
}

impl SimEncoders {
    /// Current simulated speed of one wheel [mm/s].
    pub fn wheel_speed(&self, side: Side) -> f64 {
        self.wheels[index(side)].speed
    }

    fn step(&mut self, side: Side) -> i16 {
        let i = index(side);
        let duty = self.shared.get(side);
        let target = duty / self.max_duty * self.max_wheel_speed;
        let alpha = (self.dt / self.time_constant_s).min(1.0);
        let polarity = if self.inverted[i] { -1.0 } else { 1.0 };

        let wheel = &mut self.wheels[i];
        wheel.speed += alpha * (target - wheel.speed);
        let true_ticks = wheel.speed * self.dt / self.mm_per_tick;
        wheel.raw_ticks += polarity * true_ticks / self.ratio[i];

        let counter = wheel.raw_ticks.round();
        let corrected = (counter * self.ratio[i] * polarity).round() as i64;
        let delta = corrected - wheel.reported;
        wheel.reported = corrected;

        delta.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
    }
}

impl EncoderSource for SimEncoders {
    fn start(&mut self) -> Result<(), HalError> {
        self.wheels = [WheelModel::default(); 2];
        debug!(dt = self.dt, mm_per_tick = self.mm_per_tick, "simulated encoders started");
        Ok(())
    }

    #[inline]
    fn values_and_reset(&mut self) -> EncoderDelta {
        let right = self.step(Side::Right);
        let left = self.step(Side::Left);
        EncoderDelta::new(right, left)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
