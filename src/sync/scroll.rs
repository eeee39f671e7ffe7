//! Scroll-to-reveal escalation.
//!
//! Two phases: a cheap direct lookup, then (only if the caller permits it) one
//! scroll gesture per candidate followed by a second lookup. Scrolling is
//! costly and can overshoot, so it is never attempted while the target is
//! already visible, and never repeated within a single call.

use tracing::{debug, info};

use crate::snapshot::backend::{ScrollSpec, UiBackend};
use crate::snapshot::types::NodeHandle;
use crate::sync::locator::{AnchorSet, Locator};
use crate::sync::types::{LookupError, NotFound, SyncError, SyncResult};

/// Search phase, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Direct,
    Scroll,
}

impl std::fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchPhase::Direct => write!(f, "direct"),
            SearchPhase::Scroll => write!(f, "scroll"),
        }
    }
}

/// Resolve one locator, escalating to a scroll search if permitted
pub fn locate_with_scroll(
    backend: &mut dyn UiBackend,
    locator: &Locator,
    do_scroll: bool,
) -> SyncResult<NodeHandle> {
    locate_any_with_scroll(backend, &AnchorSet::single(locator.clone()), do_scroll)
}

/// Resolve the first of `candidates` (in priority order), escalating to a
/// scroll search if permitted
pub fn locate_any_with_scroll(
    backend: &mut dyn UiBackend,
    candidates: &AnchorSet,
    do_scroll: bool,
) -> SyncResult<NodeHandle> {
    let mut last = NotFound::new(candidates.to_string(), "anchor set has no candidates");

    for locator in candidates {
        match try_find(backend, locator, SearchPhase::Direct)? {
            Ok(handle) => return Ok(handle),
            Err(e) => last = e,
        }
    }

    if !do_scroll {
        return Err(SyncError::EscalationExhausted {
            locator: label(candidates),
            scrolled: false,
            last_error: last,
        });
    }

    scroll_search(backend, candidates, last)
}

/// Scroll phase only: one gesture then one lookup per candidate.
///
/// `last` is the negative signal from the direct phase, reported if the set
/// is empty.
pub fn scroll_search(
    backend: &mut dyn UiBackend,
    candidates: &AnchorSet,
    mut last: NotFound,
) -> SyncResult<NodeHandle> {
    for locator in candidates {
        info!(%locator, "not visible, scrolling into view");
        backend.gesture(&ScrollSpec::into_view(locator.clone()))?;
        match try_find(backend, locator, SearchPhase::Scroll)? {
            Ok(handle) => return Ok(handle),
            Err(e) => last = e,
        }
    }

    Err(SyncError::EscalationExhausted {
        locator: label(candidates),
        scrolled: true,
        last_error: last,
    })
}

/// Outer error is a backend fault, inner is the negative signal
fn try_find(
    backend: &mut dyn UiBackend,
    locator: &Locator,
    phase: SearchPhase,
) -> SyncResult<Result<NodeHandle, NotFound>> {
    match backend.find(locator) {
        Ok(handle) => {
            debug!(%locator, %phase, id = %handle.id, "found");
            Ok(Ok(handle))
        }
        Err(LookupError::NotFound(e)) => {
            debug!(%locator, %phase, "not found");
            Ok(Err(e))
        }
        Err(LookupError::Backend(e)) => Err(e.into()),
    }
}

fn label(candidates: &AnchorSet) -> String {
    match candidates.candidates.as_slice() {
        [only] => only.to_string(),
        _ => candidates.to_string(),
    }
}
