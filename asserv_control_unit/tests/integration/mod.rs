//! Shared fixtures for the closed-loop integration tests.

mod emergency_stop;
mod goto_sequence;
mod odometry_tracking;
mod startup;

use std::sync::Arc;

use asserv_common::motion::config::AsservConfig;
use asserv_control_unit::command::channel::{ControlFlags, RequestConsumer};
use asserv_control_unit::cycle::AsservMain;
use asserv_control_unit::io::sim::{SimEncoders, SimMotors, sim_pair};
use asserv_control_unit::io::telemetry::MemoryTelemetry;

// ── Helpers ─────────────────────────────────────────────────────────

pub type SimAsserv = AsservMain<SimEncoders, SimMotors, MemoryTelemetry<16>>;

/// Started control loop on a fresh simulated plant.
pub fn sim_asserv(config: &AsservConfig) -> SimAsserv {
    let (encoders, motors) = sim_pair(config);
    let mut asserv = AsservMain::new(
        config,
        encoders,
        motors,
        MemoryTelemetry::new(),
        Arc::new(ControlFlags::default()),
    )
    .expect("valid config");
    asserv.start().expect("sim collaborators start");
    asserv
}

/// Tick until `done` holds, returning the number of cycles it took.
pub fn run_until(asserv: &mut SimAsserv, max_cycles: u64, done: impl Fn(&SimAsserv) -> bool) -> Option<u64> {
    for n in 1..=max_cycles {
        asserv.tick();
        if done(asserv) {
            return Some(n);
        }
    }
    None
}

/// Tick a fixed number of cycles.
pub fn settle(asserv: &mut SimAsserv, cycles: u64) {
    for _ in 0..cycles {
        asserv.tick();
    }
}

/// Drain pending requests, then tick, `cycles` times.
pub fn step(asserv: &mut SimAsserv, requests: &mut RequestConsumer<'_>, cycles: u64) {
    for _ in 0..cycles {
        asserv.drain_requests(requests);
        asserv.tick();
    }
}

/// Sequencer idle with an empty queue.
pub fn idle(asserv: &SimAsserv) -> bool {
    asserv.command_manager().is_idle() && asserv.command_manager().queue_len() == 0
}
