pub mod flow;
pub mod scenarios;
pub mod types;

pub use flow::{RunContext, error_chain, on_failure, run_flow, run_guarded};
pub use types::{FlowConfig, FlowStep, HarnessError, HarnessResult, LaunchCommand};
