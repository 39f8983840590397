//! Request/retry lifecycle of a single serial exchange
//!
//! ```text
//!   Sending ──sent──► Awaiting ──completed──► Completed
//!      ▲                 │
//!      │               failed
//!    retry               │
//!      │                 ▼
//!  BackingOff ◄── (attempts left) ──┴── (budget spent) ──► Exhausted
//! ```
//!
//! A send failure moves `Sending` straight to `BackingOff`/`Exhausted`.

use errors::{RegoError, RegoResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Sending,
    Awaiting,
    BackingOff,
    Completed,
    Exhausted,
}

impl fmt::Display for ExchangePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
pub struct Exchange {
    phase: ExchangePhase,
    attempt: u32,
    budget: u32,
}

impl Exchange {
    /// Start an exchange allowing `budget` attempts (at least one)
    pub fn new(budget: u32) -> Self {
        Self {
            phase: ExchangePhase::Sending,
            attempt: 1,
            budget: budget.max(1),
        }
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// 1-based number of the current attempt
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    fn reject(&self, event: &str) -> RegoError {
        RegoError::InvalidState {
            from: self.phase.to_string(),
            event: event.to_string(),
        }
    }

    /// Request frame written
    pub fn sent(&mut self) -> RegoResult<()> {
        match self.phase {
            ExchangePhase::Sending => {
                self.phase = ExchangePhase::Awaiting;
                Ok(())
            },
            _ => Err(self.reject("sent")),
        }
    }

    /// Valid answer decoded
    pub fn completed(&mut self) -> RegoResult<()> {
        match self.phase {
            ExchangePhase::Awaiting => {
                self.phase = ExchangePhase::Completed;
                Ok(())
            },
            _ => Err(self.reject("completed")),
        }
    }

    /// Transient failure while sending or awaiting; returns the new phase
    pub fn failed(&mut self) -> RegoResult<ExchangePhase> {
        match self.phase {
            ExchangePhase::Sending | ExchangePhase::Awaiting => {
                self.phase = if self.attempt < self.budget {
                    ExchangePhase::BackingOff
                } else {
                    ExchangePhase::Exhausted
                };
                Ok(self.phase)
            },
            _ => Err(self.reject("failed")),
        }
    }

    /// Backoff elapsed, start the next attempt
    pub fn retry(&mut self) -> RegoResult<()> {
        match self.phase {
            ExchangePhase::BackingOff => {
                self.attempt += 1;
                self.phase = ExchangePhase::Sending;
                Ok(())
            },
            _ => Err(self.reject("retry")),
        }
    }
}
