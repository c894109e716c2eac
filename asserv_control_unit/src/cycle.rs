//! Fixed-period control loop: encoders → regulators → wheel speed → motors.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`: lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity`: pin to an isolated CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)`: RT priority.
//!
//! ## Cycle Loop
//! Absolute-deadline sleep on `CLOCK_MONOTONIC` (or `Instant` deadlines
//! without the `rt` feature). A cycle that exceeds its period is counted,
//! logged and flagged in the next telemetry snapshot; the loop then resumes
//! at the next deadline on the same deadline grid, skipping missed slots.
//!
//! ## Cycle Body ([`AsservMain::tick`])
//! 1. Read-and-reset encoder deltas.
//! 2. Angle/distance deltas (right-minus-left heading convention).
//! 3. Regulator feedback.
//! 4. Odometry.
//! 5. Sequencer update, then regulator outputs.
//! 6. Every `position_divisor` cycles: limit and mix into wheel speed goals.
//! 7. Wheel speed estimation, speed controllers, motor commands (exactly 0
//!    when motors are disabled).
//! 8. Telemetry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use asserv_common::config::ConfigError;
use asserv_common::hal::driver::{EncoderSource, HalError, MotorSink, TelemetrySink};
use asserv_common::motion::config::{AsservConfig, EstimatorKind};
use asserv_common::motion::types::{
    AsservStatus, EncoderDelta, Pose, Side, TelemetrySnapshot, WheelTelemetry, Waypoint,
};
use heapless::spsc::Consumer;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::channel::{ControlFlags, ControlRequest, SharedStats};
use crate::command::manager::CommandManager;
use crate::command::CommandError;
use crate::control::limiter::{AccelerationLimiter, CommandLimiter, SimpleAccelerationLimiter};
use crate::control::pll::PllEstimator;
use crate::control::regulator::Regulator;
use crate::control::speed::{SpeedController, SpeedControllerParams};
use crate::odometry::Odometry;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of overruns detected.
    pub overruns: u64,
    /// Deadline slots skipped after overruns.
    pub skipped_slots: u64,
    /// Maximum wake-up latency [ns] (time between expected and actual wake).
    pub max_latency_ns: i64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            skipped_slots: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns += duration_ns;
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average cycle time [ns] (0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }

    fn publish(&self, shared: &SharedStats) {
        shared.cycles.store(self.cycle_count, Ordering::Relaxed);
        shared.overruns.store(self.overruns, Ordering::Relaxed);
        shared
            .last_cycle_ns
            .store(self.last_cycle_ns.max(0) as u64, Ordering::Relaxed);
        shared
            .max_cycle_ns
            .store(self.max_cycle_ns.max(0) as u64, Ordering::Relaxed);
        shared
            .max_latency_ns
            .store(self.max_latency_ns.max(0) as u64, Ordering::Relaxed);
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during construction, RT setup or collaborator lifecycle.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),
    /// Collaborator start/stop failed.
    #[error("collaborator error: {0}")]
    Hal(#[from] HalError),
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch 256 KiB of stack so the loop never faults a stack page in.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, aligned, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

/// SCHED_FIFO at the given priority.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 targets the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup sequence for the calling thread.
///
/// Must run on the control thread before [`AsservMain::run`]. All RT calls
/// are no-ops without the `rt` feature.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Drive Mode ─────────────────────────────────────────────────────

/// Source of the wheel speed goals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveMode {
    /// Goals from the position regulators (when polar control is enabled).
    Polar,
    /// Fixed wheel goals set by a test request.
    WheelSpeed { right: f64, left: f64 },
    /// Fixed distance/angle speed commands, limited and mixed as usual.
    RegulatorSpeed { distance: f64, angle: f64 },
    /// Raw motor commands; the speed loop is bypassed.
    RawMotor { right: f64, left: f64 },
}

// ─── Orchestrator ───────────────────────────────────────────────────

/// The control loop and every piece of state it owns.
pub struct AsservMain<E: EncoderSource, M: MotorSink, T: TelemetrySink> {
    encoders: E,
    motors: M,
    telemetry: T,
    flags: Arc<ControlFlags>,
    shared_stats: Arc<SharedStats>,

    odometry: Odometry,
    angle_regulator: Regulator,
    distance_regulator: Regulator,
    angle_limiter: CommandLimiter,
    distance_limiter: CommandLimiter,
    right_speed: SpeedController,
    left_speed: SpeedController,
    right_pll: PllEstimator,
    left_pll: PllEstimator,
    estimator: EstimatorKind,
    command_manager: CommandManager,

    period_s: f64,
    mm_per_tick: f64,
    wheelbase_mm: f64,
    position_divisor: u32,
    position_phase: u32,
    telemetry_interval: u64,

    mode: DriveMode,
    /// Limited angle command [mm/s].
    angle_output: f64,
    /// Limited distance command [mm/s].
    distance_output: f64,
    right_estimate: f64,
    left_estimate: f64,
    right_command: f64,
    left_command: f64,
    /// Cumulative encoder ticks since construction.
    right_ticks: i64,
    left_ticks: i64,
    motors_were_enabled: bool,
    overrun_pending: bool,
    queue_overflow: bool,

    cycle: u64,
    telemetry_drops: u64,
    stats: CycleStats,
}

impl<E: EncoderSource, M: MotorSink, T: TelemetrySink> AsservMain<E, M, T> {
    /// Build the loop from a configuration and its collaborators.
    ///
    /// The configuration is validated first; an invalid one is rejected
    /// before any loop state exists.
    pub fn new(
        config: &AsservConfig,
        encoders: E,
        motors: M,
        telemetry: T,
        flags: Arc<ControlFlags>,
    ) -> Result<Self, CycleError> {
        config.validate()?;
        let frequency_hz = f64::from(config.cycle.frequency_hz);
        let angle = &config.regulators.angle;
        let distance = &config.regulators.distance;

        let speed_controller = |c: &asserv_common::motion::config::SpeedControllerConfig| {
            SpeedController::new(
                SpeedControllerParams::from_config(c, frequency_hz),
                SimpleAccelerationLimiter::new(c.max_acceleration),
            )
        };

        Ok(Self {
            encoders,
            motors,
            telemetry,
            flags,
            shared_stats: Arc::new(SharedStats::default()),

            odometry: Odometry::new(config.robot.wheelbase_mm),
            angle_regulator: Regulator::new(angle.kp, angle.max_output),
            distance_regulator: Regulator::new(distance.kp, distance.max_output),
            angle_limiter: CommandLimiter::from_config(angle),
            distance_limiter: CommandLimiter::from_config(distance),
            right_speed: speed_controller(&config.speed.right),
            left_speed: speed_controller(&config.speed.left),
            right_pll: PllEstimator::new(config.estimator.pll_bandwidth),
            left_pll: PllEstimator::new(config.estimator.pll_bandwidth),
            estimator: config.estimator.kind,
            command_manager: CommandManager::new(config.command_manager),

            period_s: config.period_s(),
            mm_per_tick: config.robot.mm_per_tick(),
            wheelbase_mm: config.robot.wheelbase_mm,
            position_divisor: config.cycle.position_divisor,
            position_phase: 0,
            telemetry_interval: u64::from(config.cycle.telemetry_interval),

            mode: DriveMode::Polar,
            angle_output: 0.0,
            distance_output: 0.0,
            right_estimate: 0.0,
            left_estimate: 0.0,
            right_command: 0.0,
            left_command: 0.0,
            right_ticks: 0,
            left_ticks: 0,
            motors_were_enabled: false,
            overrun_pending: false,
            queue_overflow: false,

            cycle: 0,
            telemetry_drops: 0,
            stats: CycleStats::new(),
        })
    }

    /// Share loop statistics with another thread.
    pub fn with_shared_stats(mut self, stats: Arc<SharedStats>) -> Self {
        self.shared_stats = stats;
        self
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Start the encoder source and initialize the motor sink.
    pub fn start(&mut self) -> Result<(), CycleError> {
        self.encoders.start()?;
        self.motors.init()?;
        info!(
            period_ms = self.period_s * 1e3,
            position_divisor = self.position_divisor,
            estimator = ?self.estimator,
            "control loop started"
        );
        Ok(())
    }

    /// Leave the motors safe and release the encoders.
    pub fn stop(&mut self) -> Result<(), CycleError> {
        self.motors.shutdown()?;
        self.encoders.stop()?;
        info!(
            cycles = self.stats.cycle_count,
            overruns = self.stats.overruns,
            "control loop stopped"
        );
        Ok(())
    }

    // ─── Cycle Body ─────────────────────────────────────────────────

    /// Apply every pending request. Called at the start of each cycle.
    pub fn drain_requests<const N: usize>(&mut self, requests: &mut Consumer<'_, ControlRequest, N>) {
        while let Some(request) = requests.dequeue() {
            self.apply_request(request);
        }
    }

    /// Execute one control cycle.
    pub fn tick(&mut self) {
        self.cycle += 1;

        let motors_enabled = self.flags.motors_enabled();
        if motors_enabled && !self.motors_were_enabled {
            self.restart_speed_loops();
            debug!(cycle = self.cycle, "motors enabled, speed loops restarted");
        }
        self.motors_were_enabled = motors_enabled;
        let polar_enabled = self.flags.polar_enabled();

        // 1–2. Encoder deltas in the regulators' units.
        let delta = self.encoders.values_and_reset();
        self.right_ticks += i64::from(delta.right);
        self.left_ticks += i64::from(delta.left);
        let right_mm = f64::from(delta.right) * self.mm_per_tick;
        let left_mm = f64::from(delta.left) * self.mm_per_tick;
        let d_angle = (right_mm - left_mm) / self.wheelbase_mm;
        let d_distance = 0.5 * (right_mm + left_mm);

        // 3. Regulator feedback.
        self.angle_regulator.update_feedback(d_angle);
        self.distance_regulator.update_feedback(d_distance);

        // 4. Odometry.
        self.odometry.refresh(right_mm, left_mm);

        // 5. Goals for this cycle, then regulator outputs.
        let pose = self.odometry.pose();
        self.command_manager
            .update(&pose, &mut self.angle_regulator, &mut self.distance_regulator);
        let angle_command = self
            .angle_regulator
            .update_output(self.command_manager.angle_goal());
        let distance_command = self
            .distance_regulator
            .update_output(self.command_manager.distance_goal());

        // 6. Position loop.
        self.position_phase += 1;
        if self.position_phase >= self.position_divisor {
            self.position_phase = 0;
            self.position_step(polar_enabled, angle_command, distance_command);
        }

        // 7. Speed loop.
        self.estimate_speeds(delta);
        let (right, left) = match self.mode {
            DriveMode::RawMotor { right, left } => (right, left),
            _ => (
                self.right_speed.update(self.right_estimate),
                self.left_speed.update(self.left_estimate),
            ),
        };
        (self.right_command, self.left_command) = if motors_enabled {
            (right, left)
        } else {
            (0.0, 0.0)
        };
        self.motors.set_motor_speed(Side::Right, self.right_command);
        self.motors.set_motor_speed(Side::Left, self.left_command);

        // 8. Telemetry.
        if self.cycle % self.telemetry_interval == 0 {
            let snapshot = self.snapshot();
            if !self.telemetry.publish(&snapshot) {
                self.telemetry_drops += 1;
            }
            self.overrun_pending = false;
        }
    }

    fn position_step(&mut self, polar_enabled: bool, angle_command: f64, distance_command: f64) {
        let (distance_target, angle_target, mix) = match self.mode {
            DriveMode::RegulatorSpeed { distance, angle } => (distance, angle, true),
            DriveMode::Polar => (distance_command, angle_command, polar_enabled),
            DriveMode::WheelSpeed { .. } | DriveMode::RawMotor { .. } => (0.0, 0.0, false),
        };

        if !mix {
            self.angle_output = 0.0;
            self.distance_output = 0.0;
            return;
        }

        let dt = self.period_s * f64::from(self.position_divisor);
        let linear = 0.5 * (self.right_estimate + self.left_estimate);
        let angular = 0.5 * (self.right_estimate - self.left_estimate);
        self.angle_output = self
            .angle_limiter
            .limit(dt, angle_target, self.angle_output, angular);
        self.distance_output = self
            .distance_limiter
            .limit(dt, distance_target, self.distance_output, linear);

        self.right_speed
            .set_speed_goal(self.distance_output + self.angle_output);
        self.left_speed
            .set_speed_goal(self.distance_output - self.angle_output);
    }

    fn estimate_speeds(&mut self, delta: EncoderDelta) {
        match self.estimator {
            EstimatorKind::FiniteDifference => {
                let scale = self.mm_per_tick / self.period_s;
                self.right_estimate = f64::from(delta.right) * scale;
                self.left_estimate = f64::from(delta.left) * scale;
            }
            EstimatorKind::Pll => {
                self.right_pll.update(delta.right, self.period_s);
                self.left_pll.update(delta.left, self.period_s);
                self.right_estimate = self.right_pll.speed() * self.mm_per_tick;
                self.left_estimate = self.left_pll.speed() * self.mm_per_tick;
            }
        }
    }

    /// Restart both speed controllers and the command ramps from rest.
    fn restart_speed_loops(&mut self) {
        self.right_speed.reset();
        self.left_speed.reset();
        self.angle_output = 0.0;
        self.distance_output = 0.0;
        if let DriveMode::WheelSpeed { right, left } = self.mode {
            self.right_speed.set_speed_goal(right);
            self.left_speed.set_speed_goal(left);
        }
    }

    /// Status word for the current cycle.
    pub fn status(&self) -> AsservStatus {
        let mut status = AsservStatus::empty();
        status.set(AsservStatus::MOTORS_ENABLED, self.flags.motors_enabled());
        status.set(AsservStatus::POLAR_ENABLED, self.flags.polar_enabled());
        status.set(AsservStatus::IDLE, self.command_manager.is_idle());
        status.set(AsservStatus::OVERRUN, self.overrun_pending);
        status.set(AsservStatus::QUEUE_OVERFLOW, self.queue_overflow);
        status.set(AsservStatus::DIRECT_SPEED_MODE, self.mode != DriveMode::Polar);
        status
    }

    /// Intermediate values of the last cycle.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cycle: self.cycle,
            pose: self.odometry.pose(),
            angle_goal: self.command_manager.angle_goal(),
            angle_accumulator: self.angle_regulator.accumulator(),
            angle_output: self.angle_output,
            distance_goal: self.command_manager.distance_goal(),
            distance_accumulator: self.distance_regulator.accumulator(),
            distance_output: self.distance_output,
            right: WheelTelemetry {
                speed_goal: self.right_speed.speed_goal(),
                limited_speed_goal: self.right_speed.limited_speed_goal(),
                estimated_speed: self.right_estimate,
                output: self.right_command,
                integrated_output: self.right_speed.integrated_output(),
            },
            left: WheelTelemetry {
                speed_goal: self.left_speed.speed_goal(),
                limited_speed_goal: self.left_speed.limited_speed_goal(),
                estimated_speed: self.left_estimate,
                output: self.left_command,
                integrated_output: self.left_speed.integrated_output(),
            },
            command_state: self.command_manager.state(),
            queue_len: self.command_manager.queue_len().min(u8::MAX as usize) as u8,
            status: self.status(),
        }
    }

    // ─── Requests ───────────────────────────────────────────────────

    /// Apply one request from the command thread.
    pub fn apply_request(&mut self, request: ControlRequest) {
        debug!(?request, "control request");
        match request {
            ControlRequest::Waypoint(waypoint) => {
                // Overflow is recorded in the status word.
                let _ = self.add_waypoint(waypoint);
            }
            ControlRequest::Reset => self.reset(),
            ControlRequest::ResetToNormalMode => self.reset_to_normal_mode(),
            ControlRequest::ResetAngleAccumulator => self.reset_angle_accumulator(),
            ControlRequest::ResetDistanceAccumulator => self.reset_distance_accumulator(),
            ControlRequest::SetPose(pose) => self.set_pose(pose),
            ControlRequest::SetSpeedGains { side, kp, ki } => self.set_speed_gains(side, kp, ki),
            ControlRequest::SetAngleGain(kp) => self.set_angle_gain(kp),
            ControlRequest::SetDistanceGain(kp) => self.set_distance_gain(kp),
            ControlRequest::SetAngleAcceleration(a) => self.set_angle_acceleration(a),
            ControlRequest::SetDistanceAcceleration(a) => self.set_distance_acceleration(a),
            ControlRequest::SetPllBandwidth(bw) => self.set_pll_bandwidth(bw),
            ControlRequest::SetWheelsSpeed { right, left } => {
                if self.set_wheels_speed(right, left).is_err() {
                    warn!("wheel speed request ignored: polar control enabled");
                }
            }
            ControlRequest::SetRegulatorsSpeed { distance, angle } => {
                self.set_regulators_speed(distance, angle)
            }
            ControlRequest::SetMotorSpeed { side, command } => self.set_motor_speed(side, command),
        }
    }

    // ─── Runtime Operations ─────────────────────────────────────────

    /// Administrative motor enable. Re-enabling restarts the speed loops
    /// on the next cycle.
    pub fn enable_motors(&self, enabled: bool) {
        self.flags.set_motors_enabled(enabled);
    }

    /// Route regulator commands to the wheels, or not.
    pub fn enable_polar(&self, enabled: bool) {
        self.flags.set_polar_enabled(enabled);
    }

    /// Queue a waypoint.
    pub fn add_waypoint(&mut self, waypoint: Waypoint) -> Result<(), CommandError> {
        self.command_manager.push(waypoint).inspect_err(|_| {
            self.queue_overflow = true;
            warn!(?waypoint, "waypoint dropped: queue full");
        })
    }

    /// Drop all segments, hold position, leave test modes, enable polar.
    pub fn reset_to_normal_mode(&mut self) {
        self.command_manager
            .reset_to_normal_mode(&self.angle_regulator, &self.distance_regulator);
        self.mode = DriveMode::Polar;
        self.queue_overflow = false;
        self.flags.set_polar_enabled(true);
    }

    /// Zero both regulators, their goals and the pose.
    pub fn reset(&mut self) {
        self.angle_regulator.reset();
        self.distance_regulator.reset();
        self.command_manager.clear();
        self.command_manager.set_angle_goal(0.0);
        self.command_manager.set_distance_goal(0.0);
        self.odometry.reset();
        self.queue_overflow = false;
        info!("regulators and odometry reset");
    }

    /// Zero the angle accumulator, holding the current heading.
    pub fn reset_angle_accumulator(&mut self) {
        self.angle_regulator.reset();
        self.command_manager.set_angle_goal(0.0);
    }

    /// Zero the distance accumulator, holding the current position.
    pub fn reset_distance_accumulator(&mut self) {
        self.distance_regulator.reset();
        self.command_manager.set_distance_goal(0.0);
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.odometry.reset_to(pose);
    }

    pub fn set_speed_gains(&mut self, side: Side, kp: f64, ki: f64) {
        self.speed_controller_mut(side).set_gains(kp, ki);
    }

    pub fn set_angle_gain(&mut self, kp: f64) {
        self.angle_regulator.set_gain(kp);
    }

    pub fn set_distance_gain(&mut self, kp: f64) {
        self.distance_regulator.set_gain(kp);
    }

    pub fn set_angle_acceleration(&mut self, max_acceleration: f64) {
        self.angle_limiter.set_max_acceleration(max_acceleration);
    }

    pub fn set_distance_acceleration(&mut self, max_acceleration: f64) {
        self.distance_limiter.set_max_acceleration(max_acceleration);
    }

    pub fn set_pll_bandwidth(&mut self, bandwidth: f64) {
        self.right_pll.set_bandwidth(bandwidth);
        self.left_pll.set_bandwidth(bandwidth);
    }

    /// Wheel-level speed goals; refused while polar control is enabled.
    pub fn set_wheels_speed(&mut self, right: f64, left: f64) -> Result<(), CommandError> {
        if self.flags.polar_enabled() {
            return Err(CommandError::PolarEnabled);
        }
        self.mode = DriveMode::WheelSpeed { right, left };
        self.right_speed.set_speed_goal(right);
        self.left_speed.set_speed_goal(left);
        Ok(())
    }

    /// Fixed distance/angle speed commands in place of the regulators.
    pub fn set_regulators_speed(&mut self, distance: f64, angle: f64) {
        self.mode = DriveMode::RegulatorSpeed { distance, angle };
    }

    /// Raw command for one wheel, clamped to that wheel's output range.
    ///
    /// Entering this mode from another one zeroes the other wheel. The
    /// command is still forced to 0 while motors are disabled.
    pub fn set_motor_speed(&mut self, side: Side, command: f64) {
        let limit = self.speed_controller(side).max_output();
        let command = command.clamp(-limit, limit);
        let (mut right, mut left) = match self.mode {
            DriveMode::RawMotor { right, left } => (right, left),
            _ => (0.0, 0.0),
        };
        match side {
            Side::Right => right = command,
            Side::Left => left = command,
        }
        self.mode = DriveMode::RawMotor { right, left };
    }

    fn speed_controller_mut(&mut self, side: Side) -> &mut SpeedController {
        match side {
            Side::Right => &mut self.right_speed,
            Side::Left => &mut self.left_speed,
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn pose(&self) -> Pose {
        self.odometry.pose()
    }

    pub fn command_manager(&self) -> &CommandManager {
        &self.command_manager
    }

    pub fn angle_regulator(&self) -> &Regulator {
        &self.angle_regulator
    }

    pub fn distance_regulator(&self) -> &Regulator {
        &self.distance_regulator
    }

    pub fn speed_controller(&self, side: Side) -> &SpeedController {
        match side {
            Side::Right => &self.right_speed,
            Side::Left => &self.left_speed,
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    /// Last motor commands (right, left).
    pub fn motor_commands(&self) -> (f64, f64) {
        (self.right_command, self.left_command)
    }

    /// Cumulative encoder ticks (right, left).
    pub fn encoder_totals(&self) -> (i64, i64) {
        (self.right_ticks, self.left_ticks)
    }

    /// Last estimated wheel speeds (right, left) [mm/s].
    pub fn wheel_speeds(&self) -> (f64, f64) {
        (self.right_estimate, self.left_estimate)
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }

    pub fn telemetry_drops(&self) -> u64 {
        self.telemetry_drops
    }

    pub fn flags(&self) -> &Arc<ControlFlags> {
        &self.flags
    }

    pub fn shared_stats(&self) -> &Arc<SharedStats> {
        &self.shared_stats
    }

    // ─── Loop ───────────────────────────────────────────────────────

    fn period_ns(&self) -> i64 {
        (self.period_s * 1e9).round() as i64
    }

    /// Overrun bookkeeping for a cycle of `duration_ns`.
    fn check_overrun(&mut self, duration_ns: i64) {
        let budget_ns = self.period_ns();
        if duration_ns > budget_ns {
            self.stats.overruns += 1;
            self.overrun_pending = true;
            warn!(
                cycle = self.cycle,
                actual_ns = duration_ns,
                budget_ns,
                overruns = self.stats.overruns,
                "cycle overrun"
            );
        }
    }

    /// Run until `running` is cleared or `max_cycles` have executed.
    ///
    /// Uses `clock_nanosleep(TIMER_ABSTIME)` with the `rt` feature and
    /// `Instant` deadlines otherwise. Returns the final statistics.
    pub fn run<const N: usize>(
        &mut self,
        requests: &mut Consumer<'_, ControlRequest, N>,
        running: &AtomicBool,
        max_cycles: Option<u64>,
    ) -> Result<CycleStats, CycleError> {
        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(requests, running, max_cycles)?;
        }

        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(requests, running, max_cycles);
        }

        Ok(self.stats.clone())
    }

    /// Copy statistics and encoder totals out for the command thread.
    fn publish_shared(&self) {
        self.stats.publish(&self.shared_stats);
        self.shared_stats
            .right_ticks
            .store(self.right_ticks, Ordering::Relaxed);
        self.shared_stats
            .left_ticks
            .store(self.left_ticks, Ordering::Relaxed);
    }

    fn should_continue(&self, running: &AtomicBool, max_cycles: Option<u64>) -> bool {
        running.load(Ordering::Relaxed) && max_cycles.is_none_or(|max| self.stats.cycle_count < max)
    }

    /// RT cycle loop using `clock_nanosleep(TIMER_ABSTIME)`.
    #[cfg(feature = "rt")]
    fn run_rt_loop<const N: usize>(
        &mut self,
        requests: &mut Consumer<'_, ControlRequest, N>,
        running: &AtomicBool,
        max_cycles: Option<u64>,
    ) -> Result<(), CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let now = || clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")));
        let period_ns = self.period_ns();
        let mut deadline = timespec_add_ns(now()?, period_ns);

        while self.should_continue(running, max_cycles) {
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &deadline);

            let cycle_start = now()?;
            let wake_latency_ns = timespec_diff_ns(&cycle_start, &deadline).max(0);

            self.drain_requests(requests);
            self.tick();

            let cycle_end = now()?;
            let duration_ns = timespec_diff_ns(&cycle_end, &cycle_start);
            self.stats.record(duration_ns, wake_latency_ns);
            self.check_overrun(duration_ns);
            self.publish_shared();

            // Next slot on the same deadline grid, skipping the ones already missed.
            deadline = timespec_add_ns(deadline, period_ns);
            let late_ns = timespec_diff_ns(&cycle_end, &deadline);
            if late_ns >= 0 {
                let missed = late_ns / period_ns + 1;
                self.stats.skipped_slots += missed as u64;
                deadline = timespec_add_ns(deadline, missed * period_ns);
            }
        }
        Ok(())
    }

    /// Cycle loop paced by `Instant` deadlines and `std::thread::sleep`.
    #[cfg(not(feature = "rt"))]
    fn run_sim_loop<const N: usize>(
        &mut self,
        requests: &mut Consumer<'_, ControlRequest, N>,
        running: &AtomicBool,
        max_cycles: Option<u64>,
    ) {
        use std::time::{Duration, Instant};

        let period = Duration::from_nanos(self.period_ns() as u64);
        let mut deadline = Instant::now() + period;

        while self.should_continue(running, max_cycles) {
            let now = Instant::now();
            if let Some(remaining) = deadline.checked_duration_since(now) {
                std::thread::sleep(remaining);
            }

            let cycle_start = Instant::now();
            let wake_latency_ns = cycle_start.saturating_duration_since(deadline).as_nanos() as i64;

            self.drain_requests(requests);
            self.tick();

            let cycle_end = Instant::now();
            let duration_ns = cycle_end.duration_since(cycle_start).as_nanos() as i64;
            self.stats.record(duration_ns, wake_latency_ns);
            self.check_overrun(duration_ns);
            self.publish_shared();

            deadline += period;
            if cycle_end >= deadline {
                let late = cycle_end.duration_since(deadline).as_nanos();
                let missed = (late / period.as_nanos()) as u32 + 1;
                self.stats.skipped_slots += u64::from(missed);
                deadline += period * missed;
            }
        }
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let total = ts.tv_nsec() + ns;
    let secs = ts.tv_sec() + total.div_euclid(1_000_000_000);
    let nanos = total.rem_euclid(1_000_000_000);
    TimeSpec::new(secs, nanos)
}

/// Difference `a - b` in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
