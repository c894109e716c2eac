//! Integration test: dead reckoning against the simulated plant.
//!
//! Validates: encoder wiring correction, pose overwrite, arc geometry and
//! the unbounded heading accumulator.

use core::f64::consts::{FRAC_PI_2, PI};

use asserv_common::motion::config::AsservConfig;
use asserv_common::motion::types::{Pose, Waypoint};
use asserv_control_unit::command::channel::ControlRequest;

use super::{idle, run_until, settle, sim_asserv};

fn drive_line(config: &AsservConfig, distance_mm: f64) -> Pose {
    let mut asserv = sim_asserv(config);
    asserv.add_waypoint(Waypoint::StraightLine { distance_mm }).unwrap();
    assert!(run_until(&mut asserv, 4000, idle).is_some());
    settle(&mut asserv, 1000);
    asserv.pose()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn encoder_wiring_is_transparent() {
    let plain = drive_line(&AsservConfig::default(), 500.0);

    let mut wired = AsservConfig::default();
    wired.sim.encoder_inverted = [true, false];
    wired.sim.encoder_ratio = [1.02, 0.98];
    let corrected = drive_line(&wired, 500.0);

    assert!((plain.x_mm - 500.0).abs() < 10.0);
    assert!(plain.distance_to(corrected.x_mm, corrected.y_mm) < 2.0);
    assert!((plain.theta_rad - corrected.theta_rad).abs() < 0.01);
}

#[test]
fn set_pose_moves_odometry_frame() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    asserv.apply_request(ControlRequest::SetPose(Pose::new(100.0, 100.0, FRAC_PI_2)));
    asserv
        .add_waypoint(Waypoint::StraightLine { distance_mm: 200.0 })
        .unwrap();

    assert!(run_until(&mut asserv, 4000, idle).is_some());
    settle(&mut asserv, 1000);

    let pose = asserv.pose();
    assert!(pose.distance_to(100.0, 300.0) < 10.0, "pose = {pose:?}");
    assert!((pose.theta_rad - FRAC_PI_2).abs() < 0.02);
}

#[test]
fn constant_speeds_trace_an_arc() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    // Right 250 mm/s, left 150 mm/s once the ramps settle.
    asserv.set_regulators_speed(200.0, 50.0);
    settle(&mut asserv, 1000);

    let p1 = asserv.pose();
    let s1 = asserv.distance_regulator().accumulator();
    settle(&mut asserv, 1000);
    let p2 = asserv.pose();
    let s2 = asserv.distance_regulator().accumulator();

    let d_theta = p2.theta_rad - p1.theta_rad;
    let d_s = s2 - s1;
    let expected_radius = 0.5 * config.robot.wheelbase_mm * (250.0 + 150.0) / (250.0 - 150.0);
    let radius = d_s / d_theta;
    assert!(
        (radius - expected_radius).abs() / expected_radius < 0.03,
        "radius = {radius}"
    );

    // Odometry integrates the same arc.
    let chord = p1.distance_to(p2.x_mm, p2.y_mm);
    let expected_chord = 2.0 * radius * (0.5 * d_theta).sin();
    assert!((chord - expected_chord).abs() < 2.0, "chord = {chord}");

    // Heading feedback and odometry agree.
    assert!((asserv.angle_regulator().accumulator() - p2.theta_rad).abs() < 1e-6);
}

#[test]
fn heading_is_not_wrapped() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    asserv.add_waypoint(Waypoint::Turn { angle_rad: 3.0 * PI }).unwrap();

    assert!(run_until(&mut asserv, 6000, idle).is_some());
    // Arrival is detected while still swinging through the goal.
    settle(&mut asserv, 2500);
    assert!((asserv.pose().theta_rad - 3.0 * PI).abs() < 0.03);
    assert!(asserv.pose().distance_to(0.0, 0.0) < 5.0);
}
