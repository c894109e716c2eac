//! Common re-exports for convenience.

pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::consts::{
    COMMAND_QUEUE_CAPACITY, CONTROL_CHANNEL_SIZE, DEFAULT_CONFIG_PATH, TELEMETRY_CHANNEL_SIZE,
};
pub use crate::hal::driver::{EncoderSource, HalError, MotorSink, TelemetrySink};
pub use crate::motion::config::{AsservConfig, EstimatorKind};
pub use crate::motion::types::{
    AsservStatus, CommandState, EncoderDelta, Pose, Side, TelemetrySnapshot, WheelTelemetry,
    Waypoint, wrap_angle,
};
