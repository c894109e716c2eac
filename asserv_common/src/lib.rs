//! Asserv Common Library
//!
//! Shared constants, configuration loading, motion types and collaborator
//! traits for the crates of the asserv workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Default values and validation bounds
//! - [`config`] - Configuration loading traits and types
//! - [`motion`] - Pose, waypoint, telemetry and motion-control configuration types
//! - [`hal`] - Encoder / motor / telemetry collaborator traits
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use asserv_common::prelude::*;
//!
//! let pose = Pose::default();
//! assert_eq!(pose.x_mm, 0.0);
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod motion;
pub mod prelude;
