use crate::error::SweepError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Clones observe the same flag.
///
/// A token created with [`CancelToken::child`] is also cancelled whenever its
/// parent is, but cancelling the child leaves the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), parent: Some(Arc::clone(&self.flag)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|parent| parent.load(Ordering::SeqCst))
    }
}

/// Per-run cancellation and wall-clock budget, checked on every observation record.
#[derive(Debug, Clone)]
pub struct RunGuard {
    run_id: u64,
    cancel: CancelToken,
    started: Instant,
    timeout: Option<Duration>,
}

impl RunGuard {
    pub fn new(run_id: u64, cancel: CancelToken, timeout: Option<Duration>) -> Self {
        Self { run_id, cancel, started: Instant::now(), timeout }
    }

    /// Fails once the sweep is cancelled or the run is over budget.
    pub fn check(&self) -> Result<(), SweepError> {
        if self.cancel.is_cancelled() {
            return Err(SweepError::Cancelled { run_id: Some(self.run_id) });
        }
        if let Some(timeout) = self.timeout {
            let elapsed = self.started.elapsed();
            if elapsed > timeout {
                return Err(SweepError::TimedOut { run_id: self.run_id, elapsed_secs: elapsed.as_secs_f64() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn zero_budget_times_out() {
        let guard = RunGuard::new(3, CancelToken::new(), Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(guard.check(), Err(SweepError::TimedOut { run_id: 3, .. })));
    }

    #[test]
    fn cancelled_guard_names_its_run() {
        let token = CancelToken::new();
        let guard = RunGuard::new(7, token.clone(), None);
        assert!(guard.check().is_ok());
        token.cancel();
        assert_eq!(guard.check(), Err(SweepError::Cancelled { run_id: Some(7) }));
    }
}
