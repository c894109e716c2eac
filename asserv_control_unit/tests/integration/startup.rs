//! Integration test: startup sequence.
//!
//! Validates: sample config file → validation → loop start → robot at rest
//! with an idle sequencer and published telemetry.

use std::sync::Arc;

use asserv_common::config::ConfigError;
use asserv_common::motion::config::AsservConfig;
use asserv_common::motion::types::{AsservStatus, CommandState, Pose, Side};
use asserv_control_unit::command::channel::ControlFlags;
use asserv_control_unit::config::load_config_from_str;
use asserv_control_unit::cycle::{AsservMain, CycleError};
use asserv_control_unit::io::sim::sim_pair;
use asserv_control_unit::io::telemetry::MemoryTelemetry;

use super::{settle, sim_asserv};

const SAMPLE_TOML: &str = include_str!("../../config/asserv.toml");

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn sample_config_loads_and_validates() {
    let loaded = load_config_from_str(SAMPLE_TOML);
    assert!(loaded.is_ok(), "sample config failed: {:?}", loaded.err());

    let cfg = loaded.unwrap().asserv;
    assert_eq!(cfg.cycle.frequency_hz, 500);
    assert_eq!(cfg.cycle.position_divisor, 5);
    assert_eq!(cfg.robot.ticks_per_turn, 5760);
    assert!(cfg.regulators.angle.low_speed.is_none());
    assert!(cfg.regulators.distance.low_speed.is_some());
}

#[test]
fn unstable_pll_bandwidth_rejected() {
    let toml = r#"
[cycle]
frequency_hz = 500

[estimator]
kind = "pll"
pll_bandwidth = 400.0
"#;
    assert!(matches!(
        load_config_from_str(toml),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn unknown_key_rejected() {
    let toml = r#"
[robot]
wheelbase_mm = 264.0
wheel_base = 12.0
"#;
    assert!(matches!(
        load_config_from_str(toml),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn loop_refuses_unvalidated_config() {
    let mut config = AsservConfig::default();
    config.cycle.telemetry_interval = 0;
    let (encoders, motors) = sim_pair(&config);
    let built = AsservMain::new(
        &config,
        encoders,
        motors,
        MemoryTelemetry::<16>::new(),
        Arc::new(ControlFlags::default()),
    );
    assert!(matches!(built, Err(CycleError::Config(ConfigError::ValidationError(_)))));

    config.cycle.telemetry_interval = 1;
    config.speed.left.max_output = -1.0;
    let (encoders, motors) = sim_pair(&config);
    let built = AsservMain::new(
        &config,
        encoders,
        motors,
        MemoryTelemetry::<16>::new(),
        Arc::new(ControlFlags::default()),
    );
    assert!(built.is_err());
}

#[test]
fn robot_at_rest_after_start() {
    let cfg = load_config_from_str(SAMPLE_TOML).unwrap().asserv;
    let mut asserv = sim_asserv(&cfg);
    settle(&mut asserv, 500);

    assert_eq!(asserv.pose(), Pose::default());
    assert_eq!(asserv.motor_commands(), (0.0, 0.0));
    assert_eq!(asserv.command_manager().state(), CommandState::Idle);
    assert_eq!(asserv.speed_controller(Side::Right).speed_goal(), 0.0);

    let status = asserv.status();
    assert!(status.contains(AsservStatus::MOTORS_ENABLED));
    assert!(status.contains(AsservStatus::POLAR_ENABLED));
    assert!(status.contains(AsservStatus::IDLE));
    assert!(!status.contains(AsservStatus::OVERRUN));
}

#[test]
fn telemetry_follows_interval() {
    let cfg = load_config_from_str(SAMPLE_TOML).unwrap().asserv;
    let mut asserv = sim_asserv(&cfg);
    settle(&mut asserv, 100);

    // telemetry_interval = 10 in the sample file.
    assert_eq!(asserv.telemetry().published(), 10);
    let cycles: Vec<u64> = asserv.telemetry().iter().map(|s| s.cycle).collect();
    assert!(cycles.windows(2).all(|w| w[1] - w[0] == 10));
    assert_eq!(asserv.telemetry().last().map(|s| s.cycle), Some(100));
}
