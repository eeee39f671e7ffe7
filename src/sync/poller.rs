//! Bounded-time retry loop.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::snapshot::types::BackendResult;
use crate::sync::clock::Clock;
use crate::sync::types::{LookupError, WaitOptions, WaitOutcome};

/// Smallest spacing between ticks; a zero interval would spin
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Repeatedly evaluates a predicate at a fixed interval until it yields a
/// value or the timeout elapses.
///
/// `NotFound` from the predicate is an ordinary negative tick. A backend
/// fault aborts the wait on the spot instead of burning the remaining budget
/// on a broken connection.
pub struct Poller<'a> {
    options: WaitOptions,
    clock: &'a dyn Clock,
}

impl<'a> Poller<'a> {
    pub fn new(options: WaitOptions, clock: &'a dyn Clock) -> Self {
        Self { options, clock }
    }

    pub fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Same clock, different budget
    pub fn with_options(&self, options: WaitOptions) -> Poller<'a> {
        Poller {
            options,
            clock: self.clock,
        }
    }

    pub fn poll<T, F>(&self, what: &str, mut predicate: F) -> BackendResult<WaitOutcome<T>>
    where
        F: FnMut() -> Result<T, LookupError>,
    {
        let timeout = self.options.timeout;
        let interval = self.options.interval.max(MIN_INTERVAL);
        let start = self.clock.now();
        let mut ticks = 0u32;

        debug!(what, ?timeout, ?interval, "waiting");

        loop {
            ticks += 1;
            let last_error = match predicate() {
                Ok(value) => {
                    let elapsed = self.clock.now().saturating_sub(start);
                    debug!(what, ticks, ?elapsed, "resolved");
                    return Ok(WaitOutcome::Resolved {
                        value,
                        elapsed,
                        ticks,
                    });
                }
                Err(LookupError::NotFound(e)) => e,
                Err(LookupError::Backend(e)) => {
                    warn!(what, ticks, error = %e, "backend fault, aborting wait");
                    return Err(e);
                }
            };

            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed >= timeout {
                info!(what, ticks, ?elapsed, last_error = %last_error, "wait timed out");
                return Ok(WaitOutcome::TimedOut {
                    last_error,
                    elapsed,
                    ticks,
                });
            }

            // Never sleep past the budget
            self.clock.sleep(interval.min(timeout - elapsed));
        }
    }
}
