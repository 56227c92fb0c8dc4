//! The per-cycle action callback.

use crate::timer::TimerHandle;

/// Action invoked once per timer cycle.
///
/// The handle gives the action read access to the owning timer's counters
/// and lets it request a graceful stop via [`TimerHandle::stop_in_action`].
/// A returned error aborts the current run; it is logged inside the worker
/// and never reaches the caller of `start`.
pub trait TimerAction: Send + Sync {
    /// Run one cycle of work.
    ///
    /// # Errors
    ///
    /// Any error aborts the current timer run.
    fn run(&self, timer: &TimerHandle) -> anyhow::Result<()>;
}

impl<F> TimerAction for F
where
    F: Fn(&TimerHandle) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, timer: &TimerHandle) -> anyhow::Result<()> {
        self(timer)
    }
}
