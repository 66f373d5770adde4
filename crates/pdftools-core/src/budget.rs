//! Per-job processing budget
//!
//! Document size is caller controlled and copy/encode cost grows with page
//! count, so every job runs under a budget: an optional wall-clock deadline,
//! an optional page ceiling, and a cancellation token the host can trip from
//! another thread. Engines call [`JobBudget::checkpoint`] between page copies.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crate::error::BudgetError;

/// Cooperative cancellation flag shared between a job and its host.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct JobBudget {
    deadline: Option<(Instant, u64)>,
    max_pages: Option<usize>,
    cancel: CancellationToken,
}

impl JobBudget {
    /// No deadline, no page ceiling. Still cancellable.
    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            max_pages: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn new(timeout: Option<Duration>, max_pages: Option<usize>) -> Self {
        Self {
            deadline: timeout.map(|t| (Instant::now() + t, t.as_millis() as u64)),
            max_pages,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn max_pages(&self) -> Option<usize> {
        self.max_pages
    }

    /// Fails if the job was cancelled, ran past its deadline, or is about to
    /// handle more pages than allowed.
    pub fn checkpoint(&self, pages_processed: usize) -> Result<(), BudgetError> {
        if self.cancel.is_cancelled() {
            return Err(BudgetError::Cancelled);
        }

        if let Some((deadline, limit_ms)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BudgetError::DeadlineExceeded { limit_ms });
            }
        }

        if let Some(limit) = self.max_pages {
            if pages_processed > limit {
                return Err(BudgetError::PageLimitExceeded { limit });
            }
        }

        Ok(())
    }
}

impl Default for JobBudget {
    fn default() -> Self {
        Self::unbounded()
    }
}
