//! Waypoint sequencer.
//!
//! Holds a bounded FIFO of [`Waypoint`]s and, once per cycle, rewrites the
//! angle and distance goals of the position regulators from the active
//! segment and the current pose. Goals are expressed in the regulators'
//! accumulator frames; point-based segments recompute them every cycle
//! from the pose.

use asserv_common::consts::COMMAND_QUEUE_CAPACITY;
use asserv_common::motion::config::CommandManagerConfig;
use asserv_common::motion::types::{CommandState, Pose, Waypoint, wrap_angle};
use heapless::Deque;
use tracing::{debug, trace};

use super::CommandError;
use crate::control::regulator::Regulator;

/// Per-cycle goal decisions from the waypoint queue.
#[derive(Debug, Clone)]
pub struct CommandManager {
    queue: Deque<Waypoint, COMMAND_QUEUE_CAPACITY>,
    current: Option<Waypoint>,
    state: CommandState,
    angle_goal: f64,
    distance_goal: f64,
    thresholds: CommandManagerConfig,
}

/// Geometry of a point target seen from the current pose.
#[derive(Debug, Clone, Copy)]
struct Aim {
    distance: f64,
    bearing: f64,
    angle_error: f64,
}

impl Aim {
    fn new(pose: &Pose, x_mm: f64, y_mm: f64) -> Self {
        let bearing = pose.bearing_to(x_mm, y_mm);
        Self {
            distance: pose.distance_to(x_mm, y_mm),
            bearing,
            angle_error: wrap_angle(bearing - pose.theta_rad),
        }
    }
}

impl CommandManager {
    pub fn new(thresholds: CommandManagerConfig) -> Self {
        Self {
            queue: Deque::new(),
            current: None,
            state: CommandState::Idle,
            angle_goal: 0.0,
            distance_goal: 0.0,
            thresholds,
        }
    }

    // ─── Queue operations ───────────────────────────────────────────

    /// Append any waypoint. Fails only when the queue is full.
    pub fn push(&mut self, waypoint: Waypoint) -> Result<(), CommandError> {
        self.queue
            .push_back(waypoint)
            .map_err(|_| CommandError::QueueFull)
    }

    pub fn add_straight_line(&mut self, distance_mm: f64) -> Result<(), CommandError> {
        self.push(Waypoint::StraightLine { distance_mm })
    }

    pub fn add_turn(&mut self, angle_rad: f64) -> Result<(), CommandError> {
        self.push(Waypoint::Turn { angle_rad })
    }

    pub fn add_goto(&mut self, x_mm: f64, y_mm: f64) -> Result<(), CommandError> {
        self.push(Waypoint::GoTo { x_mm, y_mm })
    }

    pub fn add_goto_no_stop(&mut self, x_mm: f64, y_mm: f64) -> Result<(), CommandError> {
        self.push(Waypoint::GoToNoStop { x_mm, y_mm })
    }

    pub fn add_goto_angle(&mut self, x_mm: f64, y_mm: f64) -> Result<(), CommandError> {
        self.push(Waypoint::GoToAngle { x_mm, y_mm })
    }

    // ─── Cycle update ───────────────────────────────────────────────

    /// Advance the sequencer for this cycle.
    ///
    /// Must run after the regulators' feedback has been accumulated and
    /// before their outputs are computed.
    pub fn update(&mut self, pose: &Pose, angle_reg: &mut Regulator, distance_reg: &mut Regulator) {
        if self.current.is_none() {
            self.start_next(angle_reg, distance_reg);
        }

        if let Some(waypoint) = self.current {
            let arrived = match waypoint {
                Waypoint::StraightLine { .. } => {
                    (self.distance_goal - distance_reg.accumulator()).abs()
                        < self.thresholds.distance_threshold_mm
                }
                Waypoint::Turn { .. } => {
                    (self.angle_goal - angle_reg.accumulator()).abs()
                        < self.thresholds.angle_threshold_rad
                }
                Waypoint::GoTo { x_mm, y_mm } => {
                    let aim = Aim::new(pose, x_mm, y_mm);
                    self.track(&aim, aim.distance, angle_reg, distance_reg);
                    aim.distance < self.thresholds.distance_threshold_mm
                }
                Waypoint::GoToNoStop { x_mm, y_mm } => {
                    self.track_no_stop(pose, x_mm, y_mm, angle_reg, distance_reg)
                }
                Waypoint::GoToAngle { x_mm, y_mm } => {
                    let aim = Aim::new(pose, x_mm, y_mm);
                    self.angle_goal = angle_reg.accumulator() + aim.angle_error;
                    aim.angle_error.abs() < self.thresholds.angle_threshold_rad
                }
            };

            if arrived {
                self.finish(waypoint, angle_reg, distance_reg);
            }
        }

        self.state = match self.current {
            None => CommandState::Idle,
            Some(Waypoint::StraightLine { .. }) => CommandState::Moving,
            Some(Waypoint::Turn { .. }) => CommandState::Turning,
            Some(Waypoint::GoTo { .. }) => CommandState::GoToTracking,
            Some(Waypoint::GoToNoStop { .. }) => CommandState::GoToNoStopTracking,
            Some(Waypoint::GoToAngle { .. }) => CommandState::GoToAngleAligning,
        };
    }

    /// Point tracking: heading toward the target, distance projected on the
    /// heading error, or held while the heading error is large.
    fn track(&mut self, aim: &Aim, distance: f64, angle_reg: &Regulator, distance_reg: &Regulator) {
        self.angle_goal = angle_reg.accumulator() + aim.angle_error;
        self.distance_goal = distance_reg.accumulator()
            + if aim.angle_error.abs() <= self.thresholds.goto_angle_threshold_rad {
                distance * aim.angle_error.cos()
            } else {
                0.0
            };
    }

    /// Point tracking that hands off to the next translation waypoint early.
    ///
    /// Returns `true` on arrival at the target (no successor, or none taken).
    fn track_no_stop(
        &mut self,
        pose: &Pose,
        x_mm: f64,
        y_mm: f64,
        angle_reg: &mut Regulator,
        distance_reg: &mut Regulator,
    ) -> bool {
        let aim = Aim::new(pose, x_mm, y_mm);
        let mut commanded = aim.distance;

        let next = self
            .queue
            .front()
            .copied()
            .filter(Waypoint::is_translation_target);
        if let Some((nx, ny)) = next.and_then(|w| w.target()) {
            if aim.distance < self.thresholds.no_stop_min_next_dist_mm {
                let promoted = self.queue.pop_front();
                debug!(?promoted, distance = aim.distance, "no-stop hand-off");
                self.current = promoted;
                if let Some(Waypoint::GoTo { x_mm, y_mm }) = promoted {
                    let aim = Aim::new(pose, x_mm, y_mm);
                    self.track(&aim, aim.distance, angle_reg, distance_reg);
                } else if let Some(Waypoint::GoToNoStop { x_mm, y_mm }) = promoted {
                    return self.track_no_stop(pose, x_mm, y_mm, angle_reg, distance_reg);
                }
                return false;
            }

            let next_heading = (ny - y_mm).atan2(nx - x_mm);
            let corner = wrap_angle(next_heading - aim.bearing).abs();
            if corner <= self.thresholds.no_stop_next_angle_threshold_rad {
                commanded = commanded.max(self.thresholds.no_stop_full_speed_dist_mm);
            }
        }

        self.track(&aim, commanded, angle_reg, distance_reg);
        aim.distance < self.thresholds.distance_threshold_mm
    }

    fn start_next(&mut self, angle_reg: &mut Regulator, distance_reg: &mut Regulator) {
        let Some(waypoint) = self.queue.pop_front() else {
            return;
        };
        debug!(?waypoint, remaining = self.queue.len(), "segment start");

        match waypoint {
            Waypoint::StraightLine { distance_mm } => {
                self.rebase_distance(distance_reg);
                self.distance_goal += distance_mm;
            }
            Waypoint::Turn { angle_rad } => {
                self.rebase_angle(angle_reg);
                self.angle_goal += angle_rad;
            }
            Waypoint::GoTo { .. } | Waypoint::GoToNoStop { .. } | Waypoint::GoToAngle { .. } => {}
        }
        self.current = Some(waypoint);
    }

    fn finish(&mut self, waypoint: Waypoint, angle_reg: &mut Regulator, distance_reg: &mut Regulator) {
        trace!(?waypoint, "segment arrived");
        match waypoint {
            Waypoint::StraightLine { .. } => self.rebase_distance(distance_reg),
            Waypoint::Turn { .. } => self.rebase_angle(angle_reg),
            Waypoint::GoTo { .. } | Waypoint::GoToNoStop { .. } | Waypoint::GoToAngle { .. } => {}
        }
        self.current = None;
    }

    /// Move the distance origin to the current position, keeping the error.
    pub fn rebase_distance(&mut self, distance_reg: &mut Regulator) {
        let acc = distance_reg.accumulator();
        self.distance_goal -= acc;
        distance_reg.rebase(acc);
    }

    /// Move the angle origin to the current heading, keeping the error.
    pub fn rebase_angle(&mut self, angle_reg: &mut Regulator) {
        let acc = angle_reg.accumulator();
        self.angle_goal -= acc;
        angle_reg.rebase(acc);
    }

    // ─── Mode control ───────────────────────────────────────────────

    /// Drop the queue and the active segment and hold the current position.
    pub fn reset_to_normal_mode(&mut self, angle_reg: &Regulator, distance_reg: &Regulator) {
        self.clear();
        self.angle_goal = angle_reg.accumulator();
        self.distance_goal = distance_reg.accumulator();
    }

    /// Drop the queue and the active segment; goals are left untouched.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.current = None;
        self.state = CommandState::Idle;
    }

    pub fn set_angle_goal(&mut self, goal: f64) {
        self.angle_goal = goal;
    }

    pub fn set_distance_goal(&mut self, goal: f64) {
        self.distance_goal = goal;
    }

    // ─── Observability ──────────────────────────────────────────────

    pub fn angle_goal(&self) -> f64 {
        self.angle_goal
    }

    pub fn distance_goal(&self) -> f64 {
        self.distance_goal
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn current(&self) -> Option<Waypoint> {
        self.current
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub fn thresholds(&self) -> &CommandManagerConfig {
        &self.thresholds
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
