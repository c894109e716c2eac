//! Motion-control shared types.
//!
//! - [`types`]: pose, encoder samples, waypoints, telemetry snapshot, status flags.
//! - [`config`]: TOML configuration of the control core.

pub mod config;
pub mod types;
