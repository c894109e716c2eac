//! Integration test: trajectory sequencing in closed loop.
//!
//! Validates: relative moves, point targets, blended no-stop chains and the
//! demo circuit, queued directly and through the request channel.

use core::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use asserv_common::motion::config::AsservConfig;
use asserv_common::motion::types::{CommandState, Side, Waypoint, wrap_angle};
use asserv_control_unit::command::channel::{CommandHandle, ControlFlags, RequestQueue, SharedStats};
use asserv_control_unit::command::shell::{GOTO_TEST_PATH, Shell};
use asserv_control_unit::cycle::AsservMain;
use asserv_control_unit::io::sim::sim_pair;
use asserv_control_unit::io::telemetry::MemoryTelemetry;

use super::{idle, run_until, settle, sim_asserv, step};

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn straight_line_reaches_distance() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    asserv
        .add_waypoint(Waypoint::StraightLine { distance_mm: 300.0 })
        .unwrap();

    asserv.tick();
    assert_eq!(asserv.command_manager().state(), CommandState::Moving);

    let cycles = run_until(&mut asserv, 3000, idle);
    assert!(cycles.is_some(), "straight line never arrived");
    settle(&mut asserv, 1000);

    let pose = asserv.pose();
    assert!((pose.x_mm - 300.0).abs() < 10.0, "x = {}", pose.x_mm);
    assert!(pose.y_mm.abs() < 5.0, "y = {}", pose.y_mm);
    assert!(pose.theta_rad.abs() < 0.02);
}

#[test]
fn backward_line_then_turn() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    asserv
        .add_waypoint(Waypoint::StraightLine { distance_mm: -200.0 })
        .unwrap();
    asserv.add_waypoint(Waypoint::Turn { angle_rad: FRAC_PI_2 }).unwrap();

    assert!(run_until(&mut asserv, 6000, idle).is_some());
    settle(&mut asserv, 1000);

    let pose = asserv.pose();
    assert!((pose.x_mm + 200.0).abs() < 10.0, "x = {}", pose.x_mm);
    assert!((pose.theta_rad - FRAC_PI_2).abs() < 0.03, "theta = {}", pose.theta_rad);
}

#[test]
fn goto_turns_then_drives_to_point() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    asserv
        .add_waypoint(Waypoint::GoTo {
            x_mm: 400.0,
            y_mm: 300.0,
        })
        .unwrap();

    asserv.tick();
    assert_eq!(asserv.command_manager().state(), CommandState::GoToTracking);

    assert!(run_until(&mut asserv, 5000, idle).is_some());
    settle(&mut asserv, 1000);

    let pose = asserv.pose();
    assert!(pose.distance_to(400.0, 300.0) < 35.0, "pose = {pose:?}");
}

#[test]
fn goto_angle_faces_point() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    asserv
        .add_waypoint(Waypoint::GoToAngle {
            x_mm: 0.0,
            y_mm: -500.0,
        })
        .unwrap();

    assert!(run_until(&mut asserv, 3000, idle).is_some());
    settle(&mut asserv, 500);

    let pose = asserv.pose();
    assert!(pose.distance_to(0.0, 0.0) < 5.0, "turned in place: {pose:?}");
    assert!((wrap_angle(pose.theta_rad) + FRAC_PI_2).abs() < 0.03);
}

#[test]
fn gototest_runs_demo_circuit() {
    let config = AsservConfig::default();
    let (encoders, motors) = sim_pair(&config);
    let mut asserv = AsservMain::new(
        &config,
        encoders,
        motors,
        MemoryTelemetry::<16>::new(),
        Arc::new(ControlFlags::default()),
    )
    .unwrap();
    asserv.start().unwrap();

    let mut queue: RequestQueue = RequestQueue::new();
    let (producer, mut consumer) = queue.split();
    let mut shell = Shell::new(CommandHandle::new(
        producer,
        asserv.flags().clone(),
        Arc::new(SharedStats::default()),
    ));
    shell.run_line("gototest", &mut std::io::sink()).unwrap();

    step(&mut asserv, &mut consumer, 1);
    assert_eq!(
        asserv.command_manager().state(),
        CommandState::GoToNoStopTracking
    );
    assert_eq!(asserv.command_manager().queue_len(), GOTO_TEST_PATH.len() - 1);

    let corners = [(1100.0, 0.0), (1100.0, 400.0), (500.0, 400.0)];
    let mut closest = [f64::MAX; 3];
    for _ in 0..20_000 {
        step(&mut asserv, &mut consumer, 1);
        let pose = asserv.pose();
        for (best, &(x, y)) in closest.iter_mut().zip(&corners) {
            *best = best.min(pose.distance_to(x, y));
        }
        if idle(&asserv) {
            break;
        }
    }
    assert!(idle(&asserv), "demo circuit never completed");
    for (best, corner) in closest.iter().zip(&corners) {
        assert!(*best < 80.0, "corner {corner:?} missed by {best} mm");
    }

    // Ends facing (500, 200).
    let pose = asserv.pose();
    let bearing = (200.0 - pose.y_mm).atan2(500.0 - pose.x_mm);
    assert!(wrap_angle(bearing - pose.theta_rad).abs() < 0.05, "pose = {pose:?}");
}

#[test]
fn no_stop_chain_keeps_cruise_speed() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    for waypoint in [
        Waypoint::GoToNoStop { x_mm: 500.0, y_mm: 0.0 },
        Waypoint::GoToNoStop { x_mm: 900.0, y_mm: 0.0 },
        Waypoint::GoTo { x_mm: 1100.0, y_mm: 0.0 },
    ] {
        asserv.add_waypoint(waypoint).unwrap();
    }

    // First hand-off well before the first point.
    let promoted = run_until(&mut asserv, 3000, |a| {
        a.command_manager().current() == Some(Waypoint::GoToNoStop { x_mm: 900.0, y_mm: 0.0 })
    });
    assert!(promoted.is_some());
    let x = asserv.pose().x_mm;
    let min_next = config.command_manager.no_stop_min_next_dist_mm;
    assert!(x > 500.0 - min_next - 5.0 && x < 350.0, "promoted at x = {x}");

    // Neither the commanded nor the measured speed dips through the hand-offs.
    let mut min_goal = f64::MAX;
    let mut min_speed = f64::MAX;
    while asserv.pose().x_mm < 1000.0 {
        asserv.tick();
        let goal = 0.5
            * (asserv.speed_controller(Side::Right).speed_goal()
                + asserv.speed_controller(Side::Left).speed_goal());
        let (right, left) = asserv.wheel_speeds();
        min_goal = min_goal.min(goal);
        min_speed = min_speed.min(0.5 * (right + left));
        assert!(asserv.cycle() < 3000, "never reached x = 1000");
    }
    assert!(min_goal > 700.0, "speed goal dipped to {min_goal}");
    assert!(min_speed > 700.0, "speed dipped to {min_speed}");

    assert!(run_until(&mut asserv, 5000, idle).is_some());
    settle(&mut asserv, 2500);
    assert!(asserv.pose().distance_to(1100.0, 0.0) < 35.0, "pose = {:?}", asserv.pose());
}

#[test]
fn no_stop_hands_off_before_arrival() {
    let config = AsservConfig::default();
    let mut asserv = sim_asserv(&config);
    asserv
        .add_waypoint(Waypoint::GoToNoStop {
            x_mm: 600.0,
            y_mm: 0.0,
        })
        .unwrap();
    asserv
        .add_waypoint(Waypoint::GoTo {
            x_mm: 1000.0,
            y_mm: 0.0,
        })
        .unwrap();

    let handed_off = run_until(&mut asserv, 5000, |a| {
        a.command_manager().state() == CommandState::GoToTracking
    });
    assert!(handed_off.is_some());

    // Promotion happens while still short of the first target, at speed.
    let pose = asserv.pose();
    let min_next = config.command_manager.no_stop_min_next_dist_mm;
    assert!(pose.distance_to(600.0, 0.0) <= min_next + 5.0);
    assert!(pose.x_mm < 600.0);
    let (right, left) = asserv.wheel_speeds();
    assert!(0.5 * (right + left) > 100.0, "robot stopped at the hand-off");

    assert!(run_until(&mut asserv, 5000, idle).is_some());
    settle(&mut asserv, 1000);
    assert!(asserv.pose().distance_to(1000.0, 0.0) < 35.0);
}
