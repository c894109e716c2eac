//! Collaborator interfaces of the control core.
//!
//! The control loop never talks to hardware directly; it is handed an
//! encoder source, a motor sink and a telemetry sink at construction.

pub mod driver;
