//! cyclet binary entry point.
//!
//! Runs a single cyclic timer described by command-line flags, a TOML spec
//! file, or both (flags override the file field-wise), logging a tick per
//! cycle and a summary when the run completes.

use anyhow::{Context, Result};
use clap::Parser;
use cyclet_common::config::TimerSpec;
use cyclet_common::unit::TimeUnit;
use cyclet_runtime::{CyclicTimer, TimerHandle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Timer runner command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "cyclet",
    about = "Run a cyclic timer: an action per cycle, fixed period, optional delay",
    version,
    long_about = None
)]
struct Args {
    /// Path to a timer spec file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Time unit for cycles, delay, and period.
    #[arg(long, short = 'u')]
    unit: Option<TimeUnit>,

    /// Total cycles to run (-1 = run until interrupted).
    #[arg(long, short = 'n')]
    cycles: Option<i64>,

    /// Unit count to wait before the first cycle.
    #[arg(long, short = 'd')]
    delay: Option<i64>,

    /// Unit count to wait between cycles.
    #[arg(long, short = 'p')]
    period: Option<i64>,

    /// Timer name, also used as the worker thread name.
    #[arg(long)]
    name: Option<String>,

    /// Detach the worker thread instead of joining it on exit.
    #[arg(long)]
    daemon: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let spec = load_spec(&args)?;
    info!(
        unit = %spec.unit,
        cycles = spec.cycles,
        delay = spec.delay,
        period = spec.period,
        "Starting timer"
    );

    let ticks = Arc::new(AtomicU64::new(0));
    let tick_counter = Arc::clone(&ticks);
    let action = move |timer: &TimerHandle| -> Result<()> {
        tick_counter.fetch_add(1, Ordering::Relaxed);
        info!(cycle = timer.current_cycle(), "tick");
        Ok(())
    };

    let mut timer =
        CyclicTimer::from_spec(&spec, action).context("Failed to build timer from spec")?;

    let started = Instant::now();
    timer
        .start(spec.delay, spec.period)
        .context("Failed to start timer")?;

    if timer.is_infinite() {
        info!("Infinite timer, running until interrupted (Ctrl-C)");
    }
    timer.wait();

    let elapsed = started.elapsed();
    info!(
        ticks = ticks.load(Ordering::Relaxed),
        elapsed = %humantime::format_duration(std::time::Duration::from_millis(
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        )),
        "Timer run complete"
    );

    Ok(())
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("cyclet={level},cyclet_runtime={level},cyclet_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .init();
}

/// Resolve the timer spec: `--config`, then `CYCLET_CONFIG_PATH`, then
/// built-in defaults, with individual flags overriding the result.
fn load_spec(args: &Args) -> Result<TimerSpec> {
    let mut spec = if let Some(config_path) = &args.config {
        info!(?config_path, "Loading spec from command-line argument");
        TimerSpec::from_file(config_path)
            .with_context(|| format!("Failed to load spec from {config_path:?}"))?
    } else if let Ok(env_path) = std::env::var("CYCLET_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading spec from CYCLET_CONFIG_PATH");
            TimerSpec::from_file(&config_path).with_context(|| {
                format!("Failed to load spec from CYCLET_CONFIG_PATH={env_path}")
            })?
        } else {
            warn!(
                path = %env_path,
                "CYCLET_CONFIG_PATH set but file does not exist, using defaults"
            );
            TimerSpec::default()
        }
    } else {
        TimerSpec::default()
    };

    if let Some(unit) = args.unit {
        spec.unit = unit;
    }
    if let Some(cycles) = args.cycles {
        spec.cycles = cycles;
    }
    if let Some(delay) = args.delay {
        spec.delay = delay;
    }
    if let Some(period) = args.period {
        spec.period = period;
    }
    if let Some(name) = &args.name {
        spec.name = Some(name.clone());
    }
    if args.daemon {
        spec.daemon = true;
    }

    Ok(spec)
}
