//! Configuration structures for the motion-control core.
//!
//! All config types use `serde::Deserialize` for TOML loading.
//! Every field has a default reproducing the reference robot so that a
//! partial file (or an empty one) yields a working configuration.
//! Bounds are checked by [`AsservConfig::validate`]; a failure is fatal at
//! startup.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SharedConfig};
use crate::consts::*;

// ─── Top-Level Config ───────────────────────────────────────────────

/// Top-level configuration of the control core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AsservConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub robot: RobotConfig,
    #[serde(default)]
    pub regulators: RegulatorsConfig,
    #[serde(default)]
    pub speed: SpeedControllersConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub command_manager: CommandManagerConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

impl AsservConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.cycle.validate()?;
        self.robot.validate()?;
        self.regulators.angle.validate("regulators.angle")?;
        self.regulators.distance.validate("regulators.distance")?;
        self.speed.right.validate("speed.right")?;
        self.speed.left.validate("speed.left")?;
        self.estimator.validate()?;
        if self.estimator.kind == EstimatorKind::Pll
            && 2.0 * self.estimator.pll_bandwidth * self.period_s() > 1.0
        {
            return Err(invalid(format!(
                "estimator.pll_bandwidth {} too high for cycle.frequency_hz {} (max {})",
                self.estimator.pll_bandwidth,
                self.cycle.frequency_hz,
                self.cycle.frequency_hz as f64 / 2.0
            )));
        }
        self.command_manager.validate()?;
        self.sim.validate()?;
        Ok(())
    }

    /// Control period [s].
    #[inline]
    pub fn period_s(&self) -> f64 {
        1.0 / self.cycle.frequency_hz as f64
    }
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::ValidationError(msg)
}

fn require_positive(section: &str, name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(format!("{section}.{name} must be > 0 (got {value})")));
    }
    Ok(())
}

fn require_non_negative(section: &str, name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(format!("{section}.{name} must be >= 0 (got {value})")));
    }
    Ok(())
}

// ─── Cycle ──────────────────────────────────────────────────────────

/// Loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CycleConfig {
    /// Speed loop frequency [Hz].
    #[serde(default = "default_frequency")]
    pub frequency_hz: u32,
    /// Speed-loop ticks per position-loop tick.
    #[serde(default = "default_position_divisor")]
    pub position_divisor: u32,
    /// Publish telemetry every N cycles.
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval: u32,
}

fn default_frequency() -> u32 {
    LOOP_FREQUENCY_HZ
}
fn default_position_divisor() -> u32 {
    POSITION_DIVISOR
}
fn default_telemetry_interval() -> u32 {
    TELEMETRY_INTERVAL
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            frequency_hz: LOOP_FREQUENCY_HZ,
            position_divisor: POSITION_DIVISOR,
            telemetry_interval: TELEMETRY_INTERVAL,
        }
    }
}

impl CycleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency_hz < LOOP_FREQUENCY_HZ_MIN || self.frequency_hz > LOOP_FREQUENCY_HZ_MAX {
            return Err(invalid(format!(
                "cycle.frequency_hz {} out of range [{}, {}]",
                self.frequency_hz, LOOP_FREQUENCY_HZ_MIN, LOOP_FREQUENCY_HZ_MAX
            )));
        }
        if self.position_divisor == 0 || self.position_divisor > POSITION_DIVISOR_MAX {
            return Err(invalid(format!(
                "cycle.position_divisor {} out of range [1, {}]",
                self.position_divisor, POSITION_DIVISOR_MAX
            )));
        }
        if self.telemetry_interval == 0 {
            return Err(invalid("cycle.telemetry_interval must be >= 1".to_string()));
        }
        Ok(())
    }
}

// ─── Robot geometry ─────────────────────────────────────────────────

/// Encoder wheel geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobotConfig {
    /// Encoder wheel radius [mm].
    #[serde(default = "default_wheel_radius")]
    pub wheel_radius_mm: f64,
    /// Distance between encoder wheels [mm].
    #[serde(default = "default_wheelbase")]
    pub wheelbase_mm: f64,
    /// Ticks per wheel revolution.
    #[serde(default = "default_ticks_per_turn")]
    pub ticks_per_turn: u32,
}

fn default_wheel_radius() -> f64 {
    WHEEL_RADIUS_MM
}
fn default_wheelbase() -> f64 {
    WHEELBASE_MM
}
fn default_ticks_per_turn() -> u32 {
    TICKS_PER_TURN
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            wheel_radius_mm: WHEEL_RADIUS_MM,
            wheelbase_mm: WHEELBASE_MM,
            ticks_per_turn: TICKS_PER_TURN,
        }
    }
}

impl RobotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("robot", "wheel_radius_mm", self.wheel_radius_mm)?;
        require_positive("robot", "wheelbase_mm", self.wheelbase_mm)?;
        if self.ticks_per_turn == 0 {
            return Err(invalid("robot.ticks_per_turn must be > 0".to_string()));
        }
        Ok(())
    }

    /// Linear wheel travel per encoder tick [mm].
    #[inline]
    pub fn mm_per_tick(&self) -> f64 {
        2.0 * core::f64::consts::PI * self.wheel_radius_mm / self.ticks_per_turn as f64
    }
}

// ─── Position regulators ────────────────────────────────────────────

/// Angle and distance regulators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegulatorsConfig {
    #[serde(default = "default_angle_regulator")]
    pub angle: RegulatorConfig,
    #[serde(default = "default_distance_regulator")]
    pub distance: RegulatorConfig,
}

impl Default for RegulatorsConfig {
    fn default() -> Self {
        Self {
            angle: default_angle_regulator(),
            distance: default_distance_regulator(),
        }
    }
}

fn default_angle_regulator() -> RegulatorConfig {
    RegulatorConfig {
        kp: ANGLE_REGULATOR_KP,
        max_output: MAX_SPEED_MM_PER_S,
        max_acceleration: ANGLE_REGULATOR_MAX_ACC,
        low_speed: None,
    }
}

fn default_distance_regulator() -> RegulatorConfig {
    RegulatorConfig {
        kp: DISTANCE_REGULATOR_KP,
        max_output: MAX_SPEED_MM_PER_S,
        max_acceleration: DISTANCE_REGULATOR_MAX_ACC,
        low_speed: Some(LowSpeedLimit {
            min_acceleration: DISTANCE_REGULATOR_MIN_ACC,
            high_speed_threshold: DISTANCE_REGULATOR_LOW_SPEED_THRESHOLD,
        }),
    }
}

/// One proportional regulator and the limiter applied to its command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegulatorConfig {
    /// Proportional gain.
    pub kp: f64,
    /// Output clamp [mm/s].
    pub max_output: f64,
    /// Command acceleration limit [mm/s²].
    pub max_acceleration: f64,
    /// Gentler limit near standstill; selects the speed-dependent limiter.
    #[serde(default)]
    pub low_speed: Option<LowSpeedLimit>,
}

/// Low-speed acceleration regime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LowSpeedLimit {
    /// Acceleration limit below the threshold [mm/s²].
    pub min_acceleration: f64,
    /// Measured speed at which the full limit applies [mm/s].
    pub high_speed_threshold: f64,
}

impl RegulatorConfig {
    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        require_non_negative(section, "kp", self.kp)?;
        require_positive(section, "max_output", self.max_output)?;
        require_positive(section, "max_acceleration", self.max_acceleration)?;
        if let Some(low) = &self.low_speed {
            require_positive(section, "low_speed.min_acceleration", low.min_acceleration)?;
            require_non_negative(
                section,
                "low_speed.high_speed_threshold",
                low.high_speed_threshold,
            )?;
        }
        Ok(())
    }
}

// ─── Wheel speed controllers ────────────────────────────────────────

/// Right and left wheel PI controllers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeedControllersConfig {
    #[serde(default)]
    pub right: SpeedControllerConfig,
    #[serde(default)]
    pub left: SpeedControllerConfig,
}

/// One wheel PI controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeedControllerConfig {
    #[serde(default = "default_speed_kp")]
    pub kp: f64,
    #[serde(default = "default_speed_ki")]
    pub ki: f64,
    /// Integrator clamp.
    #[serde(default = "default_speed_max_integral")]
    pub max_integral: f64,
    /// Motor command saturation.
    #[serde(default = "default_speed_max_output")]
    pub max_output: f64,
    /// Wheel speed goal acceleration limit [mm/s²].
    #[serde(default = "default_speed_max_acc")]
    pub max_acceleration: f64,
}

fn default_speed_kp() -> f64 {
    SPEED_CONTROLLER_KP
}
fn default_speed_ki() -> f64 {
    SPEED_CONTROLLER_KI
}
fn default_speed_max_integral() -> f64 {
    SPEED_CONTROLLER_MAX_INTEGRAL
}
fn default_speed_max_output() -> f64 {
    SPEED_CONTROLLER_MAX_OUTPUT
}
fn default_speed_max_acc() -> f64 {
    SPEED_CONTROLLER_MAX_ACC
}

impl Default for SpeedControllerConfig {
    fn default() -> Self {
        Self {
            kp: SPEED_CONTROLLER_KP,
            ki: SPEED_CONTROLLER_KI,
            max_integral: SPEED_CONTROLLER_MAX_INTEGRAL,
            max_output: SPEED_CONTROLLER_MAX_OUTPUT,
            max_acceleration: SPEED_CONTROLLER_MAX_ACC,
        }
    }
}

impl SpeedControllerConfig {
    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        require_non_negative(section, "kp", self.kp)?;
        require_non_negative(section, "ki", self.ki)?;
        require_non_negative(section, "max_integral", self.max_integral)?;
        require_positive(section, "max_output", self.max_output)?;
        require_positive(section, "max_acceleration", self.max_acceleration)?;
        Ok(())
    }
}

// ─── Speed estimation ───────────────────────────────────────────────

/// Wheel speed estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    /// `delta_ticks / dt`.
    FiniteDifference,
    /// Software phase-locked loop.
    #[default]
    Pll,
}

/// Wheel speed estimator selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EstimatorConfig {
    #[serde(default)]
    pub kind: EstimatorKind,
    /// PLL bandwidth [rad/s].
    #[serde(default = "default_pll_bandwidth")]
    pub pll_bandwidth: f64,
}

fn default_pll_bandwidth() -> f64 {
    PLL_BANDWIDTH
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kind: EstimatorKind::default(),
            pll_bandwidth: PLL_BANDWIDTH,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("estimator", "pll_bandwidth", self.pll_bandwidth)
    }
}

// ─── Command manager ────────────────────────────────────────────────

/// Arrival and blending thresholds of the sequencer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandManagerConfig {
    #[serde(default = "default_angle_threshold")]
    pub angle_threshold_rad: f64,
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold_mm: f64,
    #[serde(default = "default_goto_angle_threshold")]
    pub goto_angle_threshold_rad: f64,
    #[serde(default = "default_no_stop_full_speed")]
    pub no_stop_full_speed_dist_mm: f64,
    #[serde(default = "default_no_stop_min_next")]
    pub no_stop_min_next_dist_mm: f64,
    #[serde(default = "default_no_stop_next_angle")]
    pub no_stop_next_angle_threshold_rad: f64,
}

fn default_angle_threshold() -> f64 {
    ARRIVAL_ANGLE_THRESHOLD_RAD
}
fn default_distance_threshold() -> f64 {
    ARRIVAL_DISTANCE_THRESHOLD_MM
}
fn default_goto_angle_threshold() -> f64 {
    GOTO_ANGLE_THRESHOLD_RAD
}
fn default_no_stop_full_speed() -> f64 {
    GOTO_NOSTOP_FULLSPEED_DIST_MM
}
fn default_no_stop_min_next() -> f64 {
    GOTO_NOSTOP_MIN_NEXT_DIST_MM
}
fn default_no_stop_next_angle() -> f64 {
    GOTO_NOSTOP_NEXT_ANGLE_THRESHOLD_RAD
}

impl Default for CommandManagerConfig {
    fn default() -> Self {
        Self {
            angle_threshold_rad: ARRIVAL_ANGLE_THRESHOLD_RAD,
            distance_threshold_mm: ARRIVAL_DISTANCE_THRESHOLD_MM,
            goto_angle_threshold_rad: GOTO_ANGLE_THRESHOLD_RAD,
            no_stop_full_speed_dist_mm: GOTO_NOSTOP_FULLSPEED_DIST_MM,
            no_stop_min_next_dist_mm: GOTO_NOSTOP_MIN_NEXT_DIST_MM,
            no_stop_next_angle_threshold_rad: GOTO_NOSTOP_NEXT_ANGLE_THRESHOLD_RAD,
        }
    }
}

impl CommandManagerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = "command_manager";
        require_positive(s, "angle_threshold_rad", self.angle_threshold_rad)?;
        require_positive(s, "distance_threshold_mm", self.distance_threshold_mm)?;
        require_positive(s, "goto_angle_threshold_rad", self.goto_angle_threshold_rad)?;
        require_non_negative(s, "no_stop_full_speed_dist_mm", self.no_stop_full_speed_dist_mm)?;
        require_non_negative(
            s,
            "no_stop_next_angle_threshold_rad",
            self.no_stop_next_angle_threshold_rad,
        )?;
        if self.no_stop_min_next_dist_mm <= self.distance_threshold_mm {
            return Err(invalid(format!(
                "{s}.no_stop_min_next_dist_mm ({}) must exceed distance_threshold_mm ({})",
                self.no_stop_min_next_dist_mm, self.distance_threshold_mm
            )));
        }
        Ok(())
    }
}

// ─── Simulation plant ───────────────────────────────────────────────

/// Parameters of the simulated differential-drive plant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Wheel speed reached at 100 % command [mm/s].
    #[serde(default = "default_sim_max_speed")]
    pub max_wheel_speed_mm_s: f64,
    /// First-order motor time constant [s].
    #[serde(default = "default_sim_time_constant")]
    pub time_constant_s: f64,
    /// Per-wheel encoder scale (right, left).
    #[serde(default = "default_sim_ratio")]
    pub encoder_ratio: [f64; 2],
    /// Per-wheel encoder polarity inversion (right, left).
    #[serde(default)]
    pub encoder_inverted: [bool; 2],
}

fn default_sim_max_speed() -> f64 {
    2000.0
}
fn default_sim_time_constant() -> f64 {
    0.05
}
fn default_sim_ratio() -> [f64; 2] {
    [1.0, 1.0]
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_wheel_speed_mm_s: default_sim_max_speed(),
            time_constant_s: default_sim_time_constant(),
            encoder_ratio: default_sim_ratio(),
            encoder_inverted: [false, false],
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("sim", "max_wheel_speed_mm_s", self.max_wheel_speed_mm_s)?;
        require_positive("sim", "time_constant_s", self.time_constant_s)?;
        require_positive("sim", "encoder_ratio[0]", self.encoder_ratio[0])?;
        require_positive("sim", "encoder_ratio[1]", self.encoder_ratio[1])?;
        Ok(())
    }
}
