//! # Asserv Control Unit Library
//!
//! Motion control core of a two-wheeled differential-drive robot. A
//! fixed-period cycle reads incremental encoder deltas, maintains dead-
//! reckoning odometry, runs cascaded position and wheel speed loops and
//! produces per-wheel motor commands.
//!
//! ## Control Cascade
//!
//! 1. **CommandManager**: waypoint queue, sets angle/distance goals
//! 2. **Regulator**: proportional position loops (angle, distance)
//! 3. **AccelerationLimiter**: ramps the angle/distance speed commands
//! 4. **SpeedController**: per-wheel PI speed loops
//! 5. **PllEstimator**: per-wheel speed estimation from tick deltas
//!
//! ## Threads
//!
//! The control thread owns every piece of loop state. Command and telemetry
//! threads talk to it through fixed-size SPSC queues and atomics only; the
//! cycle performs no heap allocation and never blocks on another thread.

#![deny(clippy::disallowed_types)]

pub mod command;
pub mod config;
pub mod control;
pub mod cycle;
pub mod io;
pub mod odometry;
