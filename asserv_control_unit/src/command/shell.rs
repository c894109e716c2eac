//! Line-oriented operator shell.
//!
//! Each line is one verb followed by whitespace-separated arguments. Verbs
//! map one-to-one onto control requests or flag writes; the step verbs hold
//! a test speed for a number of milliseconds on the shell thread.
//!
//! `addangle`, `adddist`, `addgoto` and `gototest` start a fresh sequence:
//! they return the loop to normal mode before queueing. `addgotonostop` and
//! `addgotoangle` append to whatever is already queued.

use std::io::Write;
use std::str::SplitWhitespace;
use std::thread;
use std::time::Duration;

use asserv_common::motion::types::{Pose, Side, Waypoint};
use thiserror::Error;

use super::CommandError;
use super::channel::{CommandHandle, ControlRequest};

/// Errors produced while parsing or executing a shell line.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("unknown command '{0}' (try 'help')")]
    UnknownVerb(String),

    #[error("{verb}: missing argument <{name}>")]
    MissingArgument { verb: &'static str, name: &'static str },

    #[error("{verb}: invalid value '{value}' for <{name}>")]
    InvalidArgument {
        verb: &'static str,
        name: &'static str,
        value: String,
    },

    #[error("{0}: too many arguments")]
    TooManyArguments(&'static str),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

/// One parsed shell line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShellCommand {
    EnableMotor(bool),
    EnablePolar(bool),
    Reset,
    Normal,
    AddAngle(f64),
    AddDist(f64),
    AddGoTo { x: f64, y: f64 },
    AddGoToNoStop { x: f64, y: f64 },
    AddGoToAngle { x: f64, y: f64 },
    GoToTest,
    AngleReset,
    DistReset,
    SetPose { x: f64, y: f64, theta: f64 },
    AngleControl(f64),
    DistControl(f64),
    SpeedControl { side: Side, kp: f64, ki: f64 },
    AngleAcc(f64),
    DistAcc(f64),
    PllBandwidth(f64),
    WheelSpeed { right: f64, left: f64 },
    WheelSpeedStep { side: Side, speed: f64, ms: u64 },
    RobotFwSpeedStep { speed: f64, ms: u64 },
    RobotAngSpeedStep { speed: f64, ms: u64 },
    MotorSpeed { side: Side, command: f64 },
    Coders,
    Stats,
    Help,
}

const HELP: &str = "\
enablemotor 0|1              motor output enable
enablepolar 0|1              regulators drive the wheels
reset                        zero regulators, goals and pose
normal                       drop all segments, hold position
addangle <rad>               queue a relative turn
adddist <mm>                 queue a straight line
addgoto <x> <y>              queue a go-to with stop
addgotonostop <x> <y>        queue a blended go-to
addgotoangle <x> <y>         queue a face-point
gototest                     queue the demo circuit
anglereset | distreset       zero one accumulator
setpose <x> <y> <theta>      overwrite the odometry pose
anglecontrol <kp>            angle regulator gain
distcontrol <kp>             distance regulator gain
speedcontrol r|l <kp> <ki>   wheel speed controller gains
angleacc <a> | distacc <a>   command acceleration limits
pllbw <bw>                   PLL bandwidth
wheelspeed <r> <l>           direct wheel speed goals (polar off)
wheelspeedstep r|l <v> <ms>  wheel speed step
robotfwspeedstep <v> <ms>    forward speed step
robotangspeedstep <v> <ms>   angular speed step
motorspeed r|l <cmd>         raw motor command (speed loop bypassed)
coders                       cumulative encoder counts
stats                        loop statistics
help                         this text";

/// Demo circuit used by `gototest`: a blended loop ending facing (500, 200).
pub const GOTO_TEST_PATH: [Waypoint; 9] = [
    Waypoint::GoToNoStop { x_mm: 500.0, y_mm: 0.0 },
    Waypoint::GoToNoStop { x_mm: 900.0, y_mm: 0.0 },
    Waypoint::GoToNoStop { x_mm: 1100.0, y_mm: 0.0 },
    Waypoint::GoToNoStop { x_mm: 1100.0, y_mm: 200.0 },
    Waypoint::GoToNoStop { x_mm: 1100.0, y_mm: 400.0 },
    Waypoint::GoToNoStop { x_mm: 900.0, y_mm: 400.0 },
    Waypoint::GoToNoStop { x_mm: 500.0, y_mm: 400.0 },
    Waypoint::GoToNoStop { x_mm: 100.0, y_mm: 200.0 },
    Waypoint::GoToAngle { x_mm: 500.0, y_mm: 200.0 },
];

// ─── Parsing ────────────────────────────────────────────────────────

struct Args<'a> {
    verb: &'static str,
    rest: SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn next_raw(&mut self, name: &'static str) -> Result<&'a str, ShellError> {
        self.rest.next().ok_or(ShellError::MissingArgument {
            verb: self.verb,
            name,
        })
    }

    fn invalid(&self, name: &'static str, value: &str) -> ShellError {
        ShellError::InvalidArgument {
            verb: self.verb,
            name,
            value: value.to_string(),
        }
    }

    fn float(&mut self, name: &'static str) -> Result<f64, ShellError> {
        let raw = self.next_raw(name)?;
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.invalid(name, raw))
    }

    fn millis(&mut self, name: &'static str) -> Result<u64, ShellError> {
        let raw = self.next_raw(name)?;
        raw.parse::<u64>().map_err(|_| self.invalid(name, raw))
    }

    fn flag(&mut self, name: &'static str) -> Result<bool, ShellError> {
        match self.next_raw(name)? {
            "1" | "on" | "true" => Ok(true),
            "0" | "off" | "false" => Ok(false),
            raw => Err(self.invalid(name, raw)),
        }
    }

    fn side(&mut self, name: &'static str) -> Result<Side, ShellError> {
        match self.next_raw(name)? {
            "r" | "right" => Ok(Side::Right),
            "l" | "left" => Ok(Side::Left),
            raw => Err(self.invalid(name, raw)),
        }
    }

    fn finish(mut self, command: ShellCommand) -> Result<ShellCommand, ShellError> {
        match self.rest.next() {
            Some(_) => Err(ShellError::TooManyArguments(self.verb)),
            None => Ok(command),
        }
    }
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<ShellCommand>, ShellError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let verb = canonical_verb(word).ok_or_else(|| ShellError::UnknownVerb(word.to_string()))?;
    let mut a = Args { verb, rest: words };

    let command = match verb {
        "enablemotor" => ShellCommand::EnableMotor(a.flag("0|1")?),
        "enablepolar" => ShellCommand::EnablePolar(a.flag("0|1")?),
        "reset" => ShellCommand::Reset,
        "normal" => ShellCommand::Normal,
        "addangle" => ShellCommand::AddAngle(a.float("rad")?),
        "adddist" => ShellCommand::AddDist(a.float("mm")?),
        "addgoto" => ShellCommand::AddGoTo {
            x: a.float("x")?,
            y: a.float("y")?,
        },
        "addgotonostop" => ShellCommand::AddGoToNoStop {
            x: a.float("x")?,
            y: a.float("y")?,
        },
        "addgotoangle" => ShellCommand::AddGoToAngle {
            x: a.float("x")?,
            y: a.float("y")?,
        },
        "gototest" => ShellCommand::GoToTest,
        "anglereset" => ShellCommand::AngleReset,
        "distreset" => ShellCommand::DistReset,
        "setpose" => ShellCommand::SetPose {
            x: a.float("x")?,
            y: a.float("y")?,
            theta: a.float("theta")?,
        },
        "anglecontrol" => ShellCommand::AngleControl(a.float("kp")?),
        "distcontrol" => ShellCommand::DistControl(a.float("kp")?),
        "speedcontrol" => ShellCommand::SpeedControl {
            side: a.side("r|l")?,
            kp: a.float("kp")?,
            ki: a.float("ki")?,
        },
        "angleacc" => ShellCommand::AngleAcc(a.float("acc")?),
        "distacc" => ShellCommand::DistAcc(a.float("acc")?),
        "pllbw" => ShellCommand::PllBandwidth(a.float("bw")?),
        "wheelspeed" => ShellCommand::WheelSpeed {
            right: a.float("right")?,
            left: a.float("left")?,
        },
        "wheelspeedstep" => ShellCommand::WheelSpeedStep {
            side: a.side("r|l")?,
            speed: a.float("speed")?,
            ms: a.millis("ms")?,
        },
        "robotfwspeedstep" => ShellCommand::RobotFwSpeedStep {
            speed: a.float("speed")?,
            ms: a.millis("ms")?,
        },
        "robotangspeedstep" => ShellCommand::RobotAngSpeedStep {
            speed: a.float("speed")?,
            ms: a.millis("ms")?,
        },
        "motorspeed" => ShellCommand::MotorSpeed {
            side: a.side("r|l")?,
            command: a.float("command")?,
        },
        "coders" => ShellCommand::Coders,
        "stats" => ShellCommand::Stats,
        _ => ShellCommand::Help,
    };
    a.finish(command).map(Some)
}

fn canonical_verb(word: &str) -> Option<&'static str> {
    const VERBS: [&str; 27] = [
        "enablemotor",
        "enablepolar",
        "reset",
        "normal",
        "addangle",
        "adddist",
        "addgoto",
        "addgotonostop",
        "addgotoangle",
        "gototest",
        "anglereset",
        "distreset",
        "setpose",
        "anglecontrol",
        "distcontrol",
        "speedcontrol",
        "angleacc",
        "distacc",
        "pllbw",
        "wheelspeed",
        "wheelspeedstep",
        "robotfwspeedstep",
        "robotangspeedstep",
        "motorspeed",
        "coders",
        "stats",
        "help",
    ];
    VERBS.iter().copied().find(|v| v.eq_ignore_ascii_case(word))
}

// ─── Execution ──────────────────────────────────────────────────────

/// Shell bound to a running control loop.
pub struct Shell<'a> {
    handle: CommandHandle<'a>,
}

impl<'a> Shell<'a> {
    pub fn new(handle: CommandHandle<'a>) -> Self {
        Self { handle }
    }

    /// Parse and execute one line, writing the response to `out`.
    pub fn run_line(&mut self, line: &str, out: &mut impl Write) -> Result<(), ShellError> {
        if let Some(command) = parse(line)? {
            self.execute(command, out)?;
        }
        Ok(())
    }

    /// Execute a parsed command.
    pub fn execute(&mut self, command: ShellCommand, out: &mut impl Write) -> Result<(), ShellError> {
        use ControlRequest as R;

        match command {
            ShellCommand::EnableMotor(on) => self.handle.enable_motors(on),
            ShellCommand::EnablePolar(on) => self.handle.enable_polar(on),
            ShellCommand::Reset => self.handle.send(R::Reset)?,
            ShellCommand::Normal => self.handle.send(R::ResetToNormalMode)?,
            ShellCommand::AddAngle(angle_rad) => {
                self.start_sequence(&[Waypoint::Turn { angle_rad }])?
            }
            ShellCommand::AddDist(distance_mm) => {
                self.start_sequence(&[Waypoint::StraightLine { distance_mm }])?
            }
            ShellCommand::AddGoTo { x, y } => {
                self.start_sequence(&[Waypoint::GoTo { x_mm: x, y_mm: y }])?
            }
            ShellCommand::AddGoToNoStop { x, y } => {
                self.handle.add_waypoint(Waypoint::GoToNoStop { x_mm: x, y_mm: y })?
            }
            ShellCommand::AddGoToAngle { x, y } => {
                self.handle.add_waypoint(Waypoint::GoToAngle { x_mm: x, y_mm: y })?
            }
            ShellCommand::GoToTest => self.start_sequence(&GOTO_TEST_PATH)?,
            ShellCommand::AngleReset => self.handle.send(R::ResetAngleAccumulator)?,
            ShellCommand::DistReset => self.handle.send(R::ResetDistanceAccumulator)?,
            ShellCommand::SetPose { x, y, theta } => {
                self.handle.send(R::SetPose(Pose::new(x, y, theta)))?
            }
            ShellCommand::AngleControl(kp) => self.handle.send(R::SetAngleGain(kp))?,
            ShellCommand::DistControl(kp) => self.handle.send(R::SetDistanceGain(kp))?,
            ShellCommand::SpeedControl { side, kp, ki } => {
                self.handle.send(R::SetSpeedGains { side, kp, ki })?
            }
            ShellCommand::AngleAcc(a) => self.handle.send(R::SetAngleAcceleration(a))?,
            ShellCommand::DistAcc(a) => self.handle.send(R::SetDistanceAcceleration(a))?,
            ShellCommand::PllBandwidth(bw) => self.handle.send(R::SetPllBandwidth(bw))?,
            ShellCommand::WheelSpeed { right, left } => self.handle.set_wheels_speed(right, left)?,
            ShellCommand::WheelSpeedStep { side, speed, ms } => {
                self.handle.enable_polar(false);
                let (right, left) = match side {
                    Side::Right => (speed, 0.0),
                    Side::Left => (0.0, speed),
                };
                self.handle.set_wheels_speed(right, left)?;
                hold(ms);
                self.handle.set_wheels_speed(0.0, 0.0)?;
            }
            ShellCommand::RobotFwSpeedStep { speed, ms } => {
                self.regulators_step(speed, 0.0, ms)?;
            }
            ShellCommand::RobotAngSpeedStep { speed, ms } => {
                self.regulators_step(0.0, speed, ms)?;
            }
            ShellCommand::MotorSpeed { side, command } => {
                self.handle.send(R::SetMotorSpeed { side, command })?
            }
            ShellCommand::Coders => {
                let s = self.handle.stats();
                writeln!(out, "encoders right={} left={}", s.right_ticks, s.left_ticks)?;
                return Ok(());
            }
            ShellCommand::Stats => {
                let s = self.handle.stats();
                writeln!(
                    out,
                    "cycles={} overruns={} last={}us max={}us max_latency={}us \
                     dropped_requests={} dropped_telemetry={}",
                    s.cycles,
                    s.overruns,
                    s.last_cycle_ns / 1000,
                    s.max_cycle_ns / 1000,
                    s.max_latency_ns / 1000,
                    s.dropped_requests,
                    s.dropped_telemetry
                )?;
                return Ok(());
            }
            ShellCommand::Help => {
                writeln!(out, "{HELP}")?;
                return Ok(());
            }
        }
        writeln!(out, "ok")?;
        Ok(())
    }

    /// Leave any test mode, drop the old sequence, then queue `waypoints`.
    fn start_sequence(&mut self, waypoints: &[Waypoint]) -> Result<(), ShellError> {
        self.handle.send(ControlRequest::ResetToNormalMode)?;
        for &waypoint in waypoints {
            self.handle.add_waypoint(waypoint)?;
        }
        Ok(())
    }

    fn regulators_step(&mut self, distance: f64, angle: f64, ms: u64) -> Result<(), ShellError> {
        self.handle
            .send(ControlRequest::SetRegulatorsSpeed { distance, angle })?;
        hold(ms);
        self.handle.send(ControlRequest::SetRegulatorsSpeed {
            distance: 0.0,
            angle: 0.0,
        })?;
        Ok(())
    }
}

fn hold(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
