//! Command processing root.
//!
//! Waypoint sequencing inside the control loop, the lock-free request
//! channel between the command thread and the control thread, and the text
//! shell that turns operator lines into requests.

pub mod channel;
pub mod manager;
pub mod shell;

use thiserror::Error;

/// Errors returned to the issuer of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The waypoint queue of the sequencer is full.
    #[error("waypoint queue full")]
    QueueFull,
    /// The request channel to the control thread is full.
    #[error("control channel full")]
    ChannelFull,
    /// A test mode was requested while polar control is enabled.
    #[error("polar control must be disabled")]
    PolarEnabled,
}
