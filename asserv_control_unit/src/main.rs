//! # Asserv Control Unit
//!
//! Runs the motion control loop against the simulated differential-drive
//! plant, with the operator shell on stdin.
//!
//! Threads:
//! - **main**: RT setup, then the fixed-period control loop.
//! - **asserv-shell**: reads shell lines from stdin, feeds the request queue.
//! - **asserv-telemetry** (`--telemetry`): drains snapshots as JSON lines.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use asserv_common::config::LogLevel;
use asserv_common::consts::DEFAULT_CONFIG_PATH;
use asserv_common::hal::driver::TelemetrySink;
use asserv_common::motion::config::AsservConfig;
use asserv_control_unit::command::channel::{
    CommandHandle, ControlFlags, RequestConsumer, RequestQueue, SharedStats,
};
use asserv_control_unit::command::shell::Shell;
use asserv_control_unit::config::load_config;
use asserv_control_unit::cycle::{AsservMain, rt_setup};
use asserv_control_unit::io::sim::{SimEncoders, SimMotors, sim_pair};
use asserv_control_unit::io::telemetry::{
    LogTelemetry, StreamTelemetry, TelemetryConsumer, TelemetryQueue,
};
use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Asserv: differential-drive motion control loop
#[derive(Parser, Debug)]
#[command(name = "asserv_control_unit")]
#[command(version)]
#[command(about = "Fixed-period motion control loop for a differential-drive robot")]
struct Args {
    /// Path to the configuration TOML.
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// CPU core to pin the control thread to (default: 1).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (default: 80).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,

    /// Stream telemetry snapshots to stdout as JSON lines.
    #[arg(long)]
    telemetry: bool,

    /// Stop after this many cycles.
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,
}

fn main() {
    let args = Args::parse();
    let loaded = load_config(&args.config);

    let level = match &loaded {
        _ if args.verbose => Level::DEBUG,
        Ok(l) => level_of(l.asserv.shared.log_level),
        Err(_) => Level::INFO,
    };
    setup_tracing(&args, level);

    info!("Asserv control unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = loaded
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|l| {
            info!("Config OK: {}", l.summary());
            run(&args, l.asserv)
        });
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Asserv control unit shutdown complete");
}

fn run(args: &Args, config: AsservConfig) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let flags = Arc::new(ControlFlags::default());
    let stats = Arc::new(SharedStats::default());

    // The shell thread blocks on stdin and is never joined, so both ends
    // of the request queue must outlive `run`.
    let requests: &'static mut RequestQueue = Box::leak(Box::new(RequestQueue::new()));
    let (producer, consumer) = requests.split();
    spawn_shell(CommandHandle::new(producer, flags.clone(), stats.clone()))?;

    let (encoders, motors) = sim_pair(&config);

    if args.telemetry {
        let queue: &'static mut TelemetryQueue = Box::leak(Box::new(TelemetryQueue::new()));
        let (tx, rx) = queue.split();
        spawn_telemetry_printer(rx, running.clone())?;
        let sink = StreamTelemetry::new(tx).with_stats(stats.clone());
        control_loop(args, &config, encoders, motors, sink, flags, stats, consumer, &running)
    } else {
        let sink = LogTelemetry::new(u64::from(config.cycle.frequency_hz));
        control_loop(args, &config, encoders, motors, sink, flags, stats, consumer, &running)
    }
}

#[allow(clippy::too_many_arguments)]
fn control_loop<T: TelemetrySink>(
    args: &Args,
    config: &AsservConfig,
    encoders: SimEncoders,
    motors: SimMotors,
    telemetry: T,
    flags: Arc<ControlFlags>,
    stats: Arc<SharedStats>,
    mut requests: RequestConsumer<'static>,
    running: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    // RT setup (mlockall, affinity, scheduler) on the control thread.
    rt_setup(args.cpu_core, args.rt_priority)?;
    info!(
        "RT setup complete (cpu_core={}, priority={})",
        args.cpu_core, args.rt_priority
    );

    let mut asserv = AsservMain::new(config, encoders, motors, telemetry, flags)?.with_shared_stats(stats);
    asserv.start()?;
    info!("Control loop initialized, entering cycle loop");

    let outcome = asserv.run(&mut requests, running, args.cycles);
    if let Err(e) = asserv.stop() {
        warn!("Shutdown failed: {e}");
    }
    let final_stats = outcome?;

    info!(
        cycles = final_stats.cycle_count,
        overruns = final_stats.overruns,
        skipped_slots = final_stats.skipped_slots,
        avg_cycle_ns = final_stats.avg_cycle_ns(),
        max_cycle_ns = final_stats.max_cycle_ns,
        "Control loop finished"
    );
    Ok(())
}

/// Read shell lines from stdin until EOF.
fn spawn_shell(handle: CommandHandle<'static>) -> std::io::Result<()> {
    thread::Builder::new().name("asserv-shell".into()).spawn(move || {
        let mut shell = Shell::new(handle);
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if let Err(e) = shell.run_line(&line, &mut stdout) {
                let _ = writeln!(stdout, "error: {e}");
            }
            let _ = stdout.flush();
        }
        info!("Shell input closed");
    })?;
    Ok(())
}

/// Print every telemetry snapshot as one JSON line.
fn spawn_telemetry_printer(
    mut rx: TelemetryConsumer<'static>,
    running: Arc<AtomicBool>,
) -> std::io::Result<()> {
    thread::Builder::new().name("asserv-telemetry".into()).spawn(move || {
        let stdout = std::io::stdout();
        while running.load(Ordering::Relaxed) {
            let mut drained = false;
            while let Some(snapshot) = rx.dequeue() {
                drained = true;
                match serde_json::to_string(&snapshot) {
                    Ok(json) => {
                        let _ = writeln!(stdout.lock(), "{json}");
                    }
                    Err(e) => warn!("Telemetry serialization failed: {e}"),
                }
            }
            if !drained {
                thread::sleep(Duration::from_millis(5));
            }
        }
    })?;
    Ok(())
}

const fn level_of(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
