//! Control engine root.
//!
//! Cascaded differential-drive control: proportional position regulators on
//! angle and distance, acceleration-limited commands, and per-wheel PI speed
//! controllers fed by a finite-difference or PLL speed estimate.

pub mod limiter;
pub mod pll;
pub mod regulator;
pub mod speed;
