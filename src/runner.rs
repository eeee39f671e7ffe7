//! Types for flow run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::diagnostics::DiagnosticsBundle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    /// Optional step that timed out
    Skipped,
    Failed,
    /// Not reached because the flow finished early or failed before it
    NotRun,
}

/// Outcome of a single flow step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position in the flow (launch commands are not counted)
    pub index: usize,

    pub label: String,

    pub status: StepStatus,

    /// Poll ticks spent, for waits
    pub ticks: Option<u32>,

    pub elapsed_ms: Option<u64>,

    /// Error chain, next screen, or skip reason
    pub detail: Option<String>,

    /// Files written by this step
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
}

impl StepRecord {
    pub fn new(index: usize, label: impl Into<String>, status: StepStatus) -> Self {
        Self {
            index,
            label: label.into(),
            status,
            ticks: None,
            elapsed_ms: None,
            detail: None,
            artifacts: Vec::new(),
        }
    }
}

/// Result of a complete flow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    pub flow: String,

    /// Session the flow ran in
    pub session_id: String,

    /// Machine that ran the flow
    pub host: String,

    /// Whether the flow completed successfully
    pub success: bool,

    /// Error chain, outermost first, if failed
    pub error: Option<Vec<String>>,

    pub steps: Vec<StepRecord>,

    /// Failure artifacts, if the failure hook ran
    pub diagnostics: Option<DiagnosticsBundle>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl FlowResult {
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}
