//! Request-scoped execution context.
//!
//! # Responsibility
//! - Carry cancellation and an optional deadline through every store call.
//!
//! # Invariants
//! - Cancellation is sticky: once cancelled, every later check fails.
//! - This layer imposes no timeout of its own; only the caller's deadline.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why an operation was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

impl Display for CancelReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::DeadlineExceeded => write!(f, "operation deadline exceeded"),
        }
    }
}

/// Cloneable trigger that cancels every context sharing it.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution context passed explicitly to every store and index call.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    cancel: CancelHandle,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// Context that is never cancelled unless its handle is triggered.
    pub fn background() -> Self {
        Self::default()
    }

    /// Sets an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a handle that cancels this context and all of its clones.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is no longer live, if it is not.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        if self.cancel.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fails fast when the context has been cancelled or has expired.
    pub fn check(&self) -> Result<(), CancelReason> {
        match self.cancel_reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelReason, ExecContext};
    use std::time::{Duration, Instant};

    #[test]
    fn background_context_is_live() {
        assert_eq!(ExecContext::background().check(), Ok(()));
    }

    #[test]
    fn cancel_handle_affects_all_clones() {
        let exec = ExecContext::background();
        let clone = exec.clone();
        exec.cancel_handle().cancel();
        assert_eq!(clone.check(), Err(CancelReason::Cancelled));
    }

    #[test]
    fn expired_deadline_reports_deadline_exceeded() {
        let exec = ExecContext::background().with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(exec.cancel_reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn cancellation_wins_over_deadline() {
        let exec = ExecContext::background().with_deadline(Instant::now() - Duration::from_millis(1));
        exec.cancel_handle().cancel();
        assert_eq!(exec.cancel_reason(), Some(CancelReason::Cancelled));
    }
}
