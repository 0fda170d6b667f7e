//! Admission decision returned by every strategy.

use std::time::Duration;

/// Outcome of a single admission check.
///
/// A blocked decision always carries a retry hint of at least one second;
/// an allowed decision always carries zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Seconds the caller should wait before retrying
    pub retry_after_secs: u64,
}

impl Decision {
    /// Admit the request.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    /// Reject the request with a retry hint in whole seconds.
    pub fn block(retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            retry_after_secs: retry_after_secs.max(1),
        }
    }

    /// Reject the request, rounding the wait up to whole seconds.
    pub fn block_for(wait: Duration) -> Self {
        let mut secs = wait.as_secs();
        if wait.subsec_nanos() > 0 {
            secs += 1;
        }
        Self::block(secs)
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}
