//! Acceptance tests for the cyclet workspace.
//!
//! These exercise the full path a user takes: describe a timer (TOML or
//! builder), run it to completion or stop it mid-flight, and observe the
//! post-run state. Timing assertions use generous margins; nothing here
//! depends on scheduler precision.

use cyclet_common::config::TimerSpec;
use cyclet_common::unit::TimeUnit;
use cyclet_common::INFINITE;
use cyclet_runtime::{CyclicTimer, TimerBuilder, TimerHandle};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn counter_action(counter: &Arc<AtomicI64>) -> impl cyclet_runtime::TimerAction + 'static {
    let counter = Arc::clone(counter);
    move |_: &TimerHandle| -> anyhow::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn toml_spec_to_completed_run() {
    let toml = r#"
        name = "drip"
        unit = "millisecond"
        cycles = 4
        delay = 10
        period = 10
    "#;
    let spec = TimerSpec::from_toml(toml).unwrap();

    let counter = Arc::new(AtomicI64::new(0));
    let mut timer = CyclicTimer::from_spec(&spec, counter_action(&counter)).unwrap();
    assert_eq!(timer.name().as_deref(), Some("drip"));
    assert_eq!(timer.unit(), TimeUnit::Millisecond);
    assert_eq!(timer.total_cycles(), 4);

    timer.start(spec.delay, spec.period).unwrap();
    timer.wait();

    assert_eq!(counter.load(Ordering::SeqCst), 4);
    assert!(!timer.is_running());
    assert_eq!(timer.passed_cycles(), 0);
    assert_eq!(timer.remaining_cycles(), 4);
}

#[test]
fn infinite_spec_runs_until_stopped() {
    let spec = TimerSpec {
        name: Some("heartbeat".into()),
        unit: TimeUnit::Millisecond,
        cycles: INFINITE,
        delay: 0,
        period: 5,
        daemon: false,
    };

    let counter = Arc::new(AtomicI64::new(0));
    let mut timer = CyclicTimer::from_spec(&spec, counter_action(&counter)).unwrap();
    assert!(timer.is_infinite());
    assert_eq!(timer.total_cycles(), 1);

    timer.start(spec.delay, spec.period).unwrap();
    std::thread::sleep(Duration::from_millis(60));
    assert!(timer.is_running());
    assert!(counter.load(Ordering::SeqCst) > 1);

    timer.stop();
    assert!(!timer.is_running());
    assert_eq!(timer.remaining_cycles(), 1);
}

#[test]
fn run_stop_run_again_reuses_configuration() {
    let counter = Arc::new(AtomicI64::new(0));
    let mut timer = TimerBuilder::new(TimeUnit::Millisecond, 3, counter_action(&counter))
        .name("twice")
        .build()
        .unwrap();

    timer.start(0, 5).unwrap();
    timer.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    // A completed timer starts again from its configured budget.
    timer.start(0, 5).unwrap();
    timer.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 6);
    assert_eq!(timer.remaining_cycles(), 3);
}

#[test]
fn self_stopping_action_via_handle() {
    let counter = Arc::new(AtomicI64::new(0));
    let c = Arc::clone(&counter);
    let action = move |t: &TimerHandle| -> anyhow::Result<()> {
        c.fetch_add(1, Ordering::SeqCst);
        if t.current_cycle() >= 2 {
            t.stop_in_action();
        }
        Ok(())
    };
    let mut timer = CyclicTimer::new(TimeUnit::Millisecond, INFINITE, action).unwrap();

    timer.start(0, 5).unwrap();
    timer.wait();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(!timer.is_running());
}

#[test]
fn stop_is_prompt_even_with_long_period() {
    let counter = Arc::new(AtomicI64::new(0));
    let mut timer =
        CyclicTimer::new(TimeUnit::Minute, INFINITE, counter_action(&counter)).unwrap();

    // First cycle fires immediately, then the worker sleeps a full minute.
    timer.start_period(1).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let t0 = Instant::now();
    timer.stop();
    assert!(t0.elapsed() < Duration::from_secs(5));
    assert!(!timer.is_running());
}

#[test]
fn failing_action_leaves_timer_restartable() {
    let counter = Arc::new(AtomicI64::new(0));
    let c = Arc::clone(&counter);
    let action = move |_: &TimerHandle| -> anyhow::Result<()> {
        let n = c.fetch_add(1, Ordering::SeqCst) + 1;
        if n == 1 {
            anyhow::bail!("transient failure");
        }
        Ok(())
    };
    let mut timer = CyclicTimer::new(TimeUnit::Millisecond, 2, action).unwrap();

    // First run aborts on the failing first cycle.
    timer.start(0, 5).unwrap();
    timer.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(!timer.is_running());
    assert_eq!(timer.remaining_cycles(), 2);

    // The same timer runs cleanly afterwards.
    timer.start(0, 5).unwrap();
    timer.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn spec_round_trip_preserves_timer_identity() {
    let spec = TimerSpec {
        name: Some("persisted".into()),
        unit: TimeUnit::Hour,
        cycles: 24,
        delay: 1,
        period: 1,
        daemon: true,
    };
    let parsed = TimerSpec::from_toml(&spec.to_toml().unwrap()).unwrap();
    assert_eq!(spec, parsed);

    let timer = CyclicTimer::from_spec(
        &parsed,
        |_: &TimerHandle| -> anyhow::Result<()> { Ok(()) },
    )
    .unwrap();
    assert_eq!(timer.name().as_deref(), Some("persisted"));
    assert_eq!(timer.unit(), TimeUnit::Hour);
    assert_eq!(timer.total_cycles(), 24);
    assert!(timer.is_daemon());
}
