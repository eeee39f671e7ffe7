//! Wait options, outcomes, and the synchronization error taxonomy.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config;
use crate::snapshot::types::BackendError;

/// Default page-object wait timeout (20 seconds)
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default polling interval (500ms)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Options for a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOptions {
    /// Total budget for the wait
    pub timeout: Duration,
    /// Fixed spacing between poll ticks
    pub interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WaitOptions {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Options taken from the process configuration
    pub fn from_config() -> Self {
        let cfg = config::get();
        Self {
            timeout: Duration::from_secs(cfg.sync.timeout_secs),
            interval: Duration::from_millis(cfg.sync.poll_interval_ms),
        }
    }

    /// A single evaluation with no waiting
    pub fn immediate() -> Self {
        Self {
            timeout: Duration::ZERO,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Result of a bounded wait. Always one of the two variants.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T> {
    Resolved {
        value: T,
        elapsed: Duration,
        ticks: u32,
    },
    TimedOut {
        /// Most recent negative signal
        last_error: NotFound,
        elapsed: Duration,
        ticks: u32,
    },
}

impl<T> WaitOutcome<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, WaitOutcome::Resolved { .. })
    }

    pub fn ticks(&self) -> u32 {
        match self {
            WaitOutcome::Resolved { ticks, .. } | WaitOutcome::TimedOut { ticks, .. } => *ticks,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Resolved { elapsed, .. } | WaitOutcome::TimedOut { elapsed, .. } => {
                *elapsed
            }
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            WaitOutcome::Resolved { value, .. } => Some(value),
            WaitOutcome::TimedOut { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WaitOutcome<U> {
        match self {
            WaitOutcome::Resolved {
                value,
                elapsed,
                ticks,
            } => WaitOutcome::Resolved {
                value: f(value),
                elapsed,
                ticks,
            },
            WaitOutcome::TimedOut {
                last_error,
                elapsed,
                ticks,
            } => WaitOutcome::TimedOut {
                last_error,
                elapsed,
                ticks,
            },
        }
    }

    /// Turn a timeout into a labeled [`SyncError::TimedOut`]
    pub fn into_result(self, what: impl Into<String>, timeout: Duration) -> SyncResult<T> {
        match self {
            WaitOutcome::Resolved { value, .. } => Ok(value),
            WaitOutcome::TimedOut { last_error, .. } => Err(SyncError::TimedOut {
                what: what.into(),
                timeout,
                last_error,
            }),
        }
    }
}

/// A single locator found nothing on a single attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no element matching {locator}: {reason}")]
pub struct NotFound {
    pub locator: String,
    pub reason: String,
}

impl NotFound {
    pub fn new(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of one lookup attempt that did not produce a node
#[derive(Debug, Error)]
pub enum LookupError {
    /// Negative signal, recoverable by polling
    #[error(transparent)]
    NotFound(#[from] NotFound),

    /// Backend fault, aborts any wait immediately
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Failures surfaced by the synchronization engine
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("timed out after {timeout:?} waiting for {what}")]
    TimedOut {
        what: String,
        timeout: Duration,
        #[source]
        last_error: NotFound,
    },

    #[error("element {locator} not found {}", scroll_note(.scrolled))]
    EscalationExhausted {
        locator: String,
        scrolled: bool,
        #[source]
        last_error: NotFound,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

fn scroll_note(scrolled: &bool) -> &'static str {
    if *scrolled {
        "after scroll"
    } else {
        "(scroll disabled by caller)"
    }
}
