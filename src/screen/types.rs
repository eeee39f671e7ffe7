// Page-object configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::snapshot::types::BackendError;
use crate::sync::locator::AnchorSet;
use crate::sync::types::SyncError;

/// A named screen: the anchors proving it is displayed, and the
/// transitions leaving it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenState {
    pub name: String,

    /// Equivalent signals; any one present means "loaded"
    pub anchors: AnchorSet,

    #[serde(default)]
    pub transitions: Vec<Transition>,

    /// Load timeout for this screen, overriding the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// One action available on a screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub name: String,
    pub target: TargetSpec,
    pub action: TransitionAction,

    /// Screen expected after the action, if it navigates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// How the element a transition acts on is resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Trial order matters
    pub candidates: AnchorSet,

    /// Allow one scroll-into-view gesture per candidate when not visible
    #[serde(default)]
    pub scroll: bool,

    /// Poll for presence this long before the direct lookup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_ms: Option<u64>,

    /// Scroll the resolved element into view before acting, even if visible
    #[serde(default)]
    pub reveal: bool,
}

impl TargetSpec {
    pub fn new(candidates: AnchorSet) -> Self {
        Self {
            candidates,
            scroll: false,
            settle_ms: None,
            reveal: false,
        }
    }

    pub fn with_scroll(mut self, scroll: bool) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn with_reveal(mut self, reveal: bool) -> Self {
        self.reveal = reveal;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle_ms = Some(settle.as_millis() as u64);
        self
    }

    pub fn settle(&self) -> Option<Duration> {
        self.settle_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionAction {
    Click,
    /// Click from page script, past overlays intercepting native clicks
    ScriptClick,
    /// Type the value of `param`, then the commit key if `commit`
    Enter {
        param: String,
        #[serde(default)]
        commit: bool,
    },
}

/// Result type for screen operations
pub type ScreenResult<T> = Result<T, ScreenError>;

/// Sync failures re-labeled with screen context
#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("screen {screen:?} did not load")]
    NotLoaded {
        screen: String,
        #[source]
        source: SyncError,
    },

    #[error("transition {transition:?} on screen {screen:?} failed")]
    TransitionFailed {
        screen: String,
        transition: String,
        #[source]
        source: SyncError,
    },

    #[error("screen {screen:?} has no transition {transition:?}")]
    UnknownTransition { screen: String, transition: String },

    #[error("transition {transition:?} requires parameter {param:?}")]
    MissingParam { transition: String, param: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}
