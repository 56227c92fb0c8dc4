//! The cyclic timer: state machine, worker thread, and cycle loop.
//!
//! A [`CyclicTimer`] owns its configuration and a dedicated worker thread
//! spawned on `start` and torn down when the cycle loop exits. Owner-side
//! mutual exclusion comes from `&mut self`; state shared with the worker
//! (counters, sleep specs, cancellation) lives behind a single mutex.
//!
//! The two sleeps per cycle (initial delay, inter-cycle period) are
//! condvar-based so that `stop` can cancel them; a cancelled sleep routes
//! through the same reset path as natural completion.

use crate::action::TimerAction;
use cyclet_common::config::TimerSpec;
use cyclet_common::convert::{to_millis_nanos, SleepSpec};
use cyclet_common::error::{TimerError, TimerResult};
use cyclet_common::unit::TimeUnit;
use cyclet_common::INFINITE;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Mutable timer state shared between the owner and the worker thread.
struct TimerState {
    unit: TimeUnit,
    name: Option<String>,
    action: Arc<dyn TimerAction>,
    daemon: bool,
    running: bool,
    infinite: bool,
    total_cycles: i64,
    remaining_cycles: i64,
    passed_cycles: i64,
    delay: Option<SleepSpec>,
    period: Option<SleepSpec>,
    /// Round-tripped unit-terms values reported by `delay()`/`period()`.
    unit_delay: i64,
    unit_period: i64,
    /// Raw arguments of the most recent `start`, retained across reset so
    /// that `restart` can reuse them.
    last_delay_units: i64,
    last_period_units: i64,
    cancel_requested: bool,
}

impl TimerState {
    /// Return the timer to its stopped defaults, preserving configuration.
    fn reset(&mut self) {
        self.delay = None;
        self.period = None;
        self.unit_delay = 0;
        self.unit_period = 0;
        self.running = false;
        self.remaining_cycles = self.total_cycles;
        self.passed_cycles = 0;
        self.cancel_requested = false;
    }

    /// Validate and apply a total cycle count, handling the infinite
    /// sentinel: the internal total is pinned to 1 and the remaining-cycles
    /// decrement is suppressed in the loop.
    fn apply_total_cycles(&mut self, total: i64) -> TimerResult<()> {
        if total < 0 && total != INFINITE {
            return Err(TimerError::Config(format!(
                "total cycles cannot be negative, got {total}"
            )));
        }
        if total == INFINITE {
            self.infinite = true;
            self.total_cycles = 1;
        } else {
            self.infinite = false;
            self.total_cycles = total;
        }
        self.remaining_cycles = self.total_cycles;
        Ok(())
    }
}

/// State plus the condvar used to cancel in-flight sleeps.
struct Shared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

impl Shared {
    /// Lock the state, recovering from poison: the worker resets state on
    /// every exit path, so a poisoned lock carries no torn invariants.
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `dur`, waking early when cancellation is requested.
    ///
    /// Returns `false` when the sleep was cancelled.
    fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now().checked_add(dur);
        let mut state = self.lock();
        loop {
            if state.cancel_requested {
                return false;
            }
            let now = Instant::now();
            let remaining = match deadline {
                Some(d) if now >= d => return true,
                Some(d) => d - now,
                // Deadline beyond the representable range: wait in slices
                // until cancelled.
                None => Duration::from_secs(3600),
            };
            let (guard, _) = self
                .wake
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}

/// Read-only view of a timer, handed to the action each cycle.
///
/// The handle exposes the timer's counters and the non-blocking
/// [`stop_in_action`](TimerHandle::stop_in_action) stop variant, which is
/// the only safe way to stop the timer from inside its own action.
pub struct TimerHandle {
    shared: Arc<Shared>,
}

impl Clone for TimerHandle {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl TimerHandle {
    /// Whether the timer is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// The timer's advisory name.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.shared.lock().name.clone()
    }

    /// The unit all counts and start arguments are expressed in.
    #[must_use]
    pub fn unit(&self) -> TimeUnit {
        self.shared.lock().unit
    }

    /// The configured cycle budget. Reports 1 for an infinite timer.
    #[must_use]
    pub fn total_cycles(&self) -> i64 {
        self.shared.lock().total_cycles
    }

    /// Cycles left before the current run completes; equals the total when
    /// not running. Never decrements for an infinite timer.
    #[must_use]
    pub fn remaining_cycles(&self) -> i64 {
        self.shared.lock().remaining_cycles
    }

    /// Cycles completed in the current run; 0 when not running.
    #[must_use]
    pub fn passed_cycles(&self) -> i64 {
        self.shared.lock().passed_cycles
    }

    /// The cycle currently executing, counted from 1.
    #[must_use]
    pub fn current_cycle(&self) -> i64 {
        self.shared.lock().passed_cycles + 1
    }

    /// The delay of the current run in unit terms (integer-truncated);
    /// 0 when never started or after reset.
    #[must_use]
    pub fn delay(&self) -> i64 {
        self.shared.lock().unit_delay
    }

    /// The period of the current run in unit terms (integer-truncated);
    /// 0 when never started or after reset.
    #[must_use]
    pub fn period(&self) -> i64 {
        self.shared.lock().unit_period
    }

    /// Whether the timer runs until explicitly stopped.
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.shared.lock().infinite
    }

    /// Whether the worker thread is detached when the owner is dropped.
    #[must_use]
    pub fn is_daemon(&self) -> bool {
        self.shared.lock().daemon
    }

    /// Request a graceful stop from inside the action, without blocking.
    ///
    /// The loop exits after the current action invocation returns. Use this
    /// instead of [`CyclicTimer::stop`] inside the action; the blocking
    /// variant would join the thread it is called from and deadlock.
    pub fn stop_in_action(&self) {
        let mut state = self.shared.lock();
        if !state.running {
            return;
        }
        state.remaining_cycles = 0;
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TimerHandle")
            .field("name", &state.name)
            .field("unit", &state.unit)
            .field("running", &state.running)
            .field("passed_cycles", &state.passed_cycles)
            .finish_non_exhaustive()
    }
}

/// A cyclic timer: runs its action once per cycle on a background thread,
/// after an optional initial delay, for a bounded or unbounded number of
/// cycles.
pub struct CyclicTimer {
    handle: TimerHandle,
    worker: Option<JoinHandle<()>>,
}

/// Builder for a [`CyclicTimer`].
pub struct TimerBuilder {
    unit: TimeUnit,
    name: Option<String>,
    total_cycles: i64,
    daemon: bool,
    action: Arc<dyn TimerAction>,
}

impl TimerBuilder {
    /// Start a builder with the given unit, cycle budget, and action.
    ///
    /// Pass [`INFINITE`] as the cycle budget for a timer that runs until
    /// explicitly stopped.
    pub fn new(unit: TimeUnit, total_cycles: i64, action: impl TimerAction + 'static) -> Self {
        Self::shared(unit, total_cycles, Arc::new(action))
    }

    /// Like [`new`](TimerBuilder::new) but with an already-shared action,
    /// allowing several timers to carry the same action identity.
    pub fn shared(unit: TimeUnit, total_cycles: i64, action: Arc<dyn TimerAction>) -> Self {
        Self {
            unit,
            name: None,
            total_cycles,
            daemon: false,
            action,
        }
    }

    /// Set the advisory name, also used as the worker thread name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set whether the worker thread is detached on drop.
    #[must_use]
    pub fn daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    /// Build the timer.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Config`] when the cycle budget is negative and
    /// not the [`INFINITE`] sentinel.
    pub fn build(self) -> TimerResult<CyclicTimer> {
        let mut state = TimerState {
            unit: self.unit,
            name: self.name,
            action: self.action,
            daemon: self.daemon,
            running: false,
            infinite: false,
            total_cycles: 0,
            remaining_cycles: 0,
            passed_cycles: 0,
            delay: None,
            period: None,
            unit_delay: 0,
            unit_period: 0,
            last_delay_units: 0,
            last_period_units: 0,
            cancel_requested: false,
        };
        state.apply_total_cycles(self.total_cycles)?;

        Ok(CyclicTimer {
            handle: TimerHandle {
                shared: Arc::new(Shared {
                    state: Mutex::new(state),
                    wake: Condvar::new(),
                }),
            },
            worker: None,
        })
    }
}

impl CyclicTimer {
    /// Create an unnamed timer.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Config`] when the cycle budget is negative and
    /// not the [`INFINITE`] sentinel.
    pub fn new(
        unit: TimeUnit,
        total_cycles: i64,
        action: impl TimerAction + 'static,
    ) -> TimerResult<Self> {
        TimerBuilder::new(unit, total_cycles, action).build()
    }

    /// Build a timer from a [`TimerSpec`], attaching the given action.
    ///
    /// Only the configuration half of the spec is applied here; the spec's
    /// `delay`/`period` are start arguments, passed to [`start`](Self::start)
    /// by the caller.
    ///
    /// # Errors
    ///
    /// Same validation as [`new`](Self::new).
    pub fn from_spec(spec: &TimerSpec, action: impl TimerAction + 'static) -> TimerResult<Self> {
        let mut builder =
            TimerBuilder::new(spec.unit, spec.cycles, action).daemon(spec.daemon);
        if let Some(name) = &spec.name {
            builder = builder.name(name.clone());
        }
        builder.build()
    }

    /// A cloneable read-only view of this timer.
    #[must_use]
    pub fn handle(&self) -> TimerHandle {
        self.handle.clone()
    }

    /// Start with an initial delay and no inter-cycle period.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn start_delay(&mut self, delay_units: i64) -> TimerResult<()> {
        self.start(delay_units, 0)
    }

    /// Start immediately with an inter-cycle period.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn start_period(&mut self, period_units: i64) -> TimerResult<()> {
        self.start(0, period_units)
    }

    /// Start the timer: convert the delay and period (expressed in the
    /// configured unit) into sleep intervals and spawn the worker thread.
    ///
    /// A no-op when already running.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Config`] when either argument is negative or
    /// the worker thread cannot be spawned, and [`TimerError::Overflow`]
    /// when a conversion exceeds the representable nanosecond range.
    pub fn start(&mut self, delay_units: i64, period_units: i64) -> TimerResult<()> {
        let thread_name = {
            let mut state = self.handle.shared.lock();
            if state.running {
                return Ok(());
            }
            if delay_units < 0 || period_units < 0 {
                return Err(TimerError::Config(format!(
                    "delay and period cannot be negative, got delay={delay_units} period={period_units}"
                )));
            }

            let delay = to_millis_nanos(delay_units, state.unit)?;
            let period = to_millis_nanos(period_units, state.unit)?;
            state.unit_delay = delay.to_units(state.unit);
            state.unit_period = period.to_units(state.unit);
            state.delay = Some(delay);
            state.period = Some(period);
            state.last_delay_units = delay_units;
            state.last_period_units = period_units;
            state.cancel_requested = false;
            state.running = true;
            state.name.clone().unwrap_or_else(|| "cyclet-timer".into())
        };

        // Reap the previous worker, if any; it has already observed
        // running == false and is past its reset.
        if let Some(old) = self.worker.take() {
            if let Err(e) = old.join() {
                warn!("previous timer worker panicked: {e:?}");
            }
        }

        let shared = Arc::clone(&self.handle.shared);
        let spawned = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_cycles(&shared));
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.handle.shared.lock().reset();
                Err(TimerError::Config(format!(
                    "failed to spawn timer worker: {e}"
                )))
            }
        }
    }

    /// Stop the timer and wait for the worker thread to exit.
    ///
    /// A no-op when not running. An in-flight sleep is cancelled; an
    /// in-flight action invocation is allowed to finish first. The join is
    /// unbounded.
    ///
    /// Must not be called from inside the action: the worker would be
    /// joining itself. Use [`TimerHandle::stop_in_action`] there instead.
    pub fn stop(&mut self) {
        {
            let mut state = self.handle.shared.lock();
            if !state.running {
                return;
            }
            state.remaining_cycles = 0;
            state.cancel_requested = true;
        }
        self.handle.shared.wake.notify_all();

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.join() {
                warn!("timer worker panicked: {e:?}");
            }
        }
    }

    /// Stop and start again with the delay and period most recently passed
    /// to [`start`](Self::start). A no-op when not running.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn restart(&mut self) -> TimerResult<()> {
        let (delay_units, period_units) = {
            let state = self.handle.shared.lock();
            if !state.running {
                return Ok(());
            }
            (state.last_delay_units, state.last_period_units)
        };
        self.stop();
        self.start(delay_units, period_units)
    }

    /// Block until the current run completes, without requesting a stop.
    ///
    /// A no-op when not running. Blocks forever on an infinite timer whose
    /// action never calls [`TimerHandle::stop_in_action`].
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.join() {
                warn!("timer worker panicked: {e:?}");
            }
        }
    }

    /// Set whether the worker thread is detached when this timer is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::IllegalState`] when the worker thread is
    /// currently alive.
    pub fn set_daemon(&mut self, daemon: bool) -> TimerResult<()> {
        if self.worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Err(TimerError::IllegalState(
                "daemon flag cannot change while the timer worker is alive".into(),
            ));
        }
        self.handle.shared.lock().daemon = daemon;
        Ok(())
    }

    /// Set the advisory name. A silent no-op while running.
    pub fn set_name(&mut self, name: Option<String>) {
        let mut state = self.handle.shared.lock();
        if state.running {
            return;
        }
        state.name = name;
    }

    /// Replace the per-cycle action. A silent no-op while running.
    pub fn set_action(&mut self, action: impl TimerAction + 'static) {
        let mut state = self.handle.shared.lock();
        if state.running {
            return;
        }
        state.action = Arc::new(action);
    }

    /// Set the unit counts and start arguments are expressed in. A silent
    /// no-op while running.
    pub fn set_unit(&mut self, unit: TimeUnit) {
        let mut state = self.handle.shared.lock();
        if state.running {
            return;
        }
        state.unit = unit;
    }

    /// Set the cycle budget, validating as construction does. A silent
    /// no-op while running.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Config`] when the count is negative and not
    /// the [`INFINITE`] sentinel.
    pub fn set_total_cycles(&mut self, total_cycles: i64) -> TimerResult<()> {
        let mut state = self.handle.shared.lock();
        if state.running {
            return Ok(());
        }
        state.apply_total_cycles(total_cycles)
    }

    /// The action invoked each cycle.
    #[must_use]
    pub fn action(&self) -> Arc<dyn TimerAction> {
        Arc::clone(&self.handle.shared.lock().action)
    }

    /// Whether the timer is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// The timer's advisory name.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.handle.name()
    }

    /// The unit all counts and start arguments are expressed in.
    #[must_use]
    pub fn unit(&self) -> TimeUnit {
        self.handle.unit()
    }

    /// The configured cycle budget. Reports 1 for an infinite timer.
    #[must_use]
    pub fn total_cycles(&self) -> i64 {
        self.handle.total_cycles()
    }

    /// Cycles left before the current run completes.
    #[must_use]
    pub fn remaining_cycles(&self) -> i64 {
        self.handle.remaining_cycles()
    }

    /// Cycles completed in the current run; 0 when not running.
    #[must_use]
    pub fn passed_cycles(&self) -> i64 {
        self.handle.passed_cycles()
    }

    /// The cycle currently executing, counted from 1.
    #[must_use]
    pub fn current_cycle(&self) -> i64 {
        self.handle.current_cycle()
    }

    /// The delay of the current run in unit terms; 0 when not running.
    #[must_use]
    pub fn delay(&self) -> i64 {
        self.handle.delay()
    }

    /// The period of the current run in unit terms; 0 when not running.
    #[must_use]
    pub fn period(&self) -> i64 {
        self.handle.period()
    }

    /// Whether the timer runs until explicitly stopped.
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.handle.is_infinite()
    }

    /// Whether the worker thread is detached when this timer is dropped.
    #[must_use]
    pub fn is_daemon(&self) -> bool {
        self.handle.is_daemon()
    }
}

impl fmt::Debug for CyclicTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.handle.shared.lock();
        f.debug_struct("CyclicTimer")
            .field("name", &state.name)
            .field("unit", &state.unit)
            .field("total_cycles", &state.total_cycles)
            .field("infinite", &state.infinite)
            .field("running", &state.running)
            .field("daemon", &state.daemon)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CyclicTimer {
    /// Two timers are equal iff name, cycle budget, unit, and action
    /// identity all match.
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.handle.shared, &other.handle.shared) {
            return true;
        }
        let a = self.handle.shared.lock();
        let b = other.handle.shared.lock();
        a.name == b.name
            && a.total_cycles == b.total_cycles
            && a.infinite == b.infinite
            && a.unit == b.unit
            && Arc::ptr_eq(&a.action, &b.action)
    }
}

impl Eq for CyclicTimer {}

impl Hash for CyclicTimer {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        let state = self.handle.shared.lock();
        state.name.hash(hasher);
        state.total_cycles.hash(hasher);
        state.infinite.hash(hasher);
        state.unit.hash(hasher);
        (Arc::as_ptr(&state.action).cast::<()>() as usize).hash(hasher);
    }
}

impl Drop for CyclicTimer {
    fn drop(&mut self) {
        let daemon = self.handle.shared.lock().daemon;
        if daemon {
            // Detach: the worker keeps running on its own copy of the state.
            self.worker.take();
        } else {
            self.stop();
        }
    }
}

/// The worker thread body: initial delay, cycle loop, reset.
fn run_cycles(shared: &Arc<Shared>) {
    let (delay, period, action) = {
        let state = shared.lock();
        (
            state.delay.unwrap_or_default(),
            state.period.unwrap_or_default(),
            Arc::clone(&state.action),
        )
    };
    debug!(
        delay_ms = delay.millis,
        period_ms = period.millis,
        "timer worker started"
    );

    let cancelled = cycle_loop(shared, delay, period, &action);

    let mut state = shared.lock();
    let passed = state.passed_cycles;
    state.reset();
    drop(state);

    if cancelled {
        debug!(cycles = passed, "timer run cancelled during sleep");
    } else {
        debug!(cycles = passed, "timer run complete");
    }
}

/// Run the cycles until the budget is exhausted, the action fails, or a
/// sleep is cancelled. Returns `true` when cancelled mid-sleep.
fn cycle_loop(
    shared: &Arc<Shared>,
    delay: SleepSpec,
    period: SleepSpec,
    action: &Arc<dyn TimerAction>,
) -> bool {
    if !shared.sleep(delay.as_duration()) {
        return true;
    }

    loop {
        {
            let state = shared.lock();
            if state.remaining_cycles <= 0 {
                return false;
            }
        }

        let handle = TimerHandle {
            shared: Arc::clone(shared),
        };
        match catch_unwind(AssertUnwindSafe(|| action.run(&handle))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("timer action failed, aborting run: {e:#}");
                return false;
            }
            Err(_) => {
                error!("timer action panicked, aborting run");
                return false;
            }
        }

        {
            let mut state = shared.lock();
            // The action may have requested a stop via stop_in_action.
            if state.remaining_cycles == 0 {
                return false;
            }
            if !state.infinite {
                state.remaining_cycles -= 1;
            }
            state.passed_cycles += 1;
        }

        if !shared.sleep(period.as_duration()) {
            return true;
        }
    }
}
