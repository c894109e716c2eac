//! Collaborator implementations shipped with the control unit.
//!
//! - [`sim`]: deterministic differential-drive plant (encoders + motors).
//! - [`telemetry`]: telemetry sinks (null, in-memory, log, SPSC stream).

pub mod sim;
pub mod telemetry;
