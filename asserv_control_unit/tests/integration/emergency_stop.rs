//! Integration test: motor disable, normal-mode recovery and direct speed modes.
//!
//! Validates: exact zero output while disabled → integrals and ramps
//! restart on re-enable → trajectory resumes; reset to normal mode holds
//! the current position.

use std::sync::Arc;

use asserv_common::motion::config::AsservConfig;
use asserv_common::motion::types::{AsservStatus, Side, Waypoint};
use asserv_control_unit::command::channel::{
    CommandHandle, ControlFlags, ControlRequest, RequestQueue, SharedStats,
};
use asserv_control_unit::command::shell::Shell;
use asserv_control_unit::cycle::{AsservMain, DriveMode};
use asserv_control_unit::io::sim::sim_pair;
use asserv_control_unit::io::telemetry::MemoryTelemetry;

use super::{idle, run_until, settle, sim_asserv, step};

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn disabled_motors_receive_exact_zero_and_resume() {
    let config = AsservConfig::default();
    let (encoders, motors) = sim_pair(&config);
    let monitor = motors.monitor();
    let mut asserv = AsservMain::new(
        &config,
        encoders,
        motors,
        MemoryTelemetry::<16>::new(),
        Arc::new(ControlFlags::default()),
    )
    .unwrap();
    asserv.start().unwrap();
    asserv
        .add_waypoint(Waypoint::StraightLine { distance_mm: 1000.0 })
        .unwrap();

    settle(&mut asserv, 300);
    assert!(monitor.command(Side::Right) > 0.0);

    asserv.enable_motors(false);
    for _ in 0..600 {
        asserv.tick();
        assert_eq!(monitor.command(Side::Right), 0.0);
        assert_eq!(monitor.command(Side::Left), 0.0);
    }
    assert!(!asserv.status().contains(AsservStatus::MOTORS_ENABLED));

    // Coasted to a stop, short of the goal.
    let (right, left) = asserv.wheel_speeds();
    assert!(right.abs() < 1.0 && left.abs() < 1.0);
    let stopped_at = asserv.pose().x_mm;
    assert!(stopped_at < 900.0);
    settle(&mut asserv, 100);
    assert!((asserv.pose().x_mm - stopped_at).abs() < 0.5);

    // Rising edge: integrals and command ramps start from zero.
    asserv.enable_motors(true);
    asserv.tick();
    let max_integral = config.speed.right.max_integral;
    assert!(asserv.speed_controller(Side::Right).integrated_output().abs() < max_integral / 10.0);
    let dt_position = config.period_s() * f64::from(config.cycle.position_divisor);
    let max_step = config.regulators.distance.max_acceleration * dt_position;
    assert!(asserv.snapshot().distance_output.abs() <= max_step + 1e-9);

    assert!(run_until(&mut asserv, 5000, idle).is_some());
    settle(&mut asserv, 2000);
    assert!((asserv.pose().x_mm - 1000.0).abs() < 10.0, "x = {}", asserv.pose().x_mm);
}

#[test]
fn normal_mode_holds_current_position() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    let mut queue: RequestQueue = RequestQueue::new();
    let (mut producer, mut consumer) = queue.split();

    producer
        .enqueue(ControlRequest::Waypoint(Waypoint::StraightLine { distance_mm: 2000.0 }))
        .unwrap();
    producer
        .enqueue(ControlRequest::Waypoint(Waypoint::Turn { angle_rad: 1.0 }))
        .unwrap();
    step(&mut asserv, &mut consumer, 400);
    assert_eq!(asserv.command_manager().queue_len(), 1);

    producer.enqueue(ControlRequest::ResetToNormalMode).unwrap();
    step(&mut asserv, &mut consumer, 1);
    assert!(idle(&asserv));
    let hold = asserv.command_manager().distance_goal();
    assert!((hold - asserv.distance_regulator().accumulator()).abs() < 10.0);

    settle(&mut asserv, 1500);
    assert!((asserv.distance_regulator().accumulator() - hold).abs() < 5.0);
    assert!(asserv.pose().x_mm < 1500.0);
    assert!(asserv.pose().theta_rad.abs() < 0.02);
}

#[test]
fn direct_wheel_speed_then_back_to_normal() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    let mut queue: RequestQueue = RequestQueue::new();
    let (producer, mut consumer) = queue.split();
    let mut shell = Shell::new(CommandHandle::new(
        producer,
        asserv.flags().clone(),
        Arc::new(SharedStats::default()),
    ));
    let mut out = Vec::new();

    // Refused while the regulators own the wheels.
    assert!(shell.run_line("wheelspeed 200 200", &mut out).is_err());

    shell.run_line("enablepolar 0", &mut out).unwrap();
    shell.run_line("wheelspeed 200 200", &mut out).unwrap();
    step(&mut asserv, &mut consumer, 1000);

    assert_eq!(asserv.mode(), DriveMode::WheelSpeed { right: 200.0, left: 200.0 });
    assert!(asserv.status().contains(AsservStatus::DIRECT_SPEED_MODE));
    let x = asserv.pose().x_mm;
    assert!(x > 330.0 && x < 410.0, "x = {x}");
    let (right, _) = asserv.wheel_speeds();
    assert!((right - 200.0).abs() < 10.0);

    shell.run_line("normal", &mut out).unwrap();
    step(&mut asserv, &mut consumer, 1500);
    assert_eq!(asserv.mode(), DriveMode::Polar);
    assert!(asserv.flags().polar_enabled());
    let (right, left) = asserv.wheel_speeds();
    assert!(right.abs() < 5.0 && left.abs() < 5.0);
}

#[test]
fn new_sequence_after_wheel_step_leaves_test_mode() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    let mut queue: RequestQueue = RequestQueue::new();
    let (producer, mut consumer) = queue.split();
    let mut shell = Shell::new(CommandHandle::new(
        producer,
        asserv.flags().clone(),
        Arc::new(SharedStats::default()),
    ));
    let mut out = Vec::new();

    shell.run_line("wheelspeedstep r 100 0", &mut out).unwrap();
    step(&mut asserv, &mut consumer, 200);
    assert_eq!(asserv.mode(), DriveMode::WheelSpeed { right: 0.0, left: 0.0 });
    assert!(!asserv.flags().polar_enabled());
    let x_before = asserv.pose().x_mm;

    shell.run_line("adddist 300", &mut out).unwrap();
    step(&mut asserv, &mut consumer, 1);
    assert_eq!(asserv.mode(), DriveMode::Polar);
    assert!(asserv.flags().polar_enabled());

    let mut arrived = false;
    for _ in 0..3000 {
        step(&mut asserv, &mut consumer, 1);
        if idle(&asserv) {
            arrived = true;
            break;
        }
    }
    assert!(arrived, "straight line never completed");
    settle(&mut asserv, 1000);
    let travelled = asserv.pose().x_mm - x_before;
    assert!((travelled - 300.0).abs() < 10.0, "travelled {travelled} mm");
}
