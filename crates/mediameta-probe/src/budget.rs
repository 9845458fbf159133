//! Cooperative cancellation and wall-clock budget.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::Interrupt;

/// The stop conditions checked at every suspension point of an extraction.
#[derive(Debug, Clone)]
pub struct Budget {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Budget {
    /// A budget expiring `limit` from now, also honouring `cancel`.
    pub fn new(limit: Duration, cancel: CancellationToken) -> Self {
        Self {
            // An unrepresentable deadline means "never".
            deadline: Instant::now().checked_add(limit),
            cancel,
        }
    }

    /// A budget that never expires on its own.
    pub fn unlimited() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Report whether extraction must stop now.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupt::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
