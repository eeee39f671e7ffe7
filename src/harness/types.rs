use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::config::{self, ConfigError};
use crate::screen::{ScreenError, ScreenState};
use crate::snapshot::types::BackendError;

/// A scripted UI flow, loadable from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Also the prefix of failure artifacts (`<name>_fail_<ts>`)
    pub name: String,

    /// Privileged commands that bring the target on screen
    #[serde(default)]
    pub launch: Vec<LaunchCommand>,

    pub steps: Vec<FlowStep>,

    /// Screens in addition to the built-in catalog; same name overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screens: Vec<ScreenState>,
}

impl FlowConfig {
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        Ok(config::load_json(path)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchCommand {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// One step of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FlowStep {
    /// Wait for a screen's anchors
    WaitLoaded {
        screen: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        /// A timeout is recorded as skipped instead of failing the flow
        #[serde(default)]
        optional: bool,
        /// Once loaded, the flow is complete
        #[serde(default)]
        finish_if_loaded: bool,
        /// Capture artifacts with this prefix once loaded
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capture: Option<String>,
    },

    /// Perform a transition of a screen
    Perform {
        screen: String,
        transition: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        params: HashMap<String, String>,
    },

    /// Save a screenshot and tree dump
    Capture { prefix: String },
}

impl FlowStep {
    pub fn wait(screen: &str) -> Self {
        FlowStep::WaitLoaded {
            screen: screen.to_string(),
            timeout_ms: None,
            optional: false,
            finish_if_loaded: false,
            capture: None,
        }
    }

    pub fn perform(screen: &str, transition: &str) -> Self {
        FlowStep::Perform {
            screen: screen.to_string(),
            transition: transition.to_string(),
            params: HashMap::new(),
        }
    }

    pub fn enter(screen: &str, transition: &str, param: &str, value: &str) -> Self {
        FlowStep::Perform {
            screen: screen.to_string(),
            transition: transition.to_string(),
            params: HashMap::from([(param.to_string(), value.to_string())]),
        }
    }

    pub fn capture(prefix: &str) -> Self {
        FlowStep::Capture {
            prefix: prefix.to_string(),
        }
    }

    /// Screen this step refers to, if any
    pub fn screen(&self) -> Option<&str> {
        match self {
            FlowStep::WaitLoaded { screen, .. } | FlowStep::Perform { screen, .. } => {
                Some(screen.as_str())
            }
            FlowStep::Capture { .. } => None,
        }
    }

    /// Short label for logs and step records
    pub fn label(&self) -> String {
        match self {
            FlowStep::WaitLoaded { screen, .. } => format!("wait_loaded {}", screen),
            FlowStep::Perform {
                screen, transition, ..
            } => format!("perform {}.{}", screen, transition),
            FlowStep::Capture { prefix } => format!("capture {}", prefix),
        }
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("flow {flow:?} refers to unknown screen {screen:?}")]
    UnknownScreen { flow: String, screen: String },

    #[error("launch command {command:?} failed")]
    Launch {
        command: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Screen(#[from] ScreenError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
