//! Flow execution.
//!
//! A flow runs inside one [`DeviceSession`]. Step failures do not escape as
//! errors: they trigger the failure hook (artifact capture and a visible-text
//! dump) and are reported in the returned [`FlowResult`]. Only setup problems
//! (unknown screens, session acquisition) are returned as `Err`.

use chrono::Utc;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::diagnostics::{self, ArtifactSink, DiagnosticsBundle, OutputEncoding};
use crate::harness::types::{FlowConfig, FlowStep, HarnessError, HarnessResult};
use crate::runner::{FlowResult, StepRecord, StepStatus};
use crate::screen::{ScreenError, ScreenState, catalog};
use crate::session::{DeviceSession, SessionFactory};
use crate::snapshot::backend::UiBackend;
use crate::sync::clock::Clock;
use crate::sync::poller::Poller;
use crate::sync::types::WaitOptions;

/// Everything a flow needs besides the session
pub struct RunContext<'a> {
    pub clock: &'a dyn Clock,

    /// Default wait budget; screens and steps may override the timeout
    pub options: WaitOptions,

    pub sink: &'a mut dyn ArtifactSink,

    /// Visible texts kept per capture
    pub text_limit: usize,

    pub encoding: OutputEncoding,

    /// Receives the visible-text dump
    pub out: &'a mut dyn Write,

    /// Terminated when the session is released
    pub app_package: Option<String>,
}

/// The failure hook: capture artifacts, then dump visible texts.
///
/// Never fails.
pub fn on_failure(
    backend: &mut dyn UiBackend,
    ctx: &mut RunContext<'_>,
    prefix: &str,
) -> DiagnosticsBundle {
    let bundle = diagnostics::capture(backend, ctx.sink, prefix, ctx.text_limit);
    bundle.dump(ctx.encoding, ctx.out);
    bundle
}

/// Run `body` against `backend`, calling the failure hook with `prefix` if it
/// returns an error. The error is passed through unchanged.
pub fn run_guarded<T, E, F>(
    backend: &mut dyn UiBackend,
    ctx: &mut RunContext<'_>,
    prefix: &str,
    body: F,
) -> Result<T, E>
where
    F: FnOnce(&mut dyn UiBackend) -> Result<T, E>,
    E: std::fmt::Display,
{
    let result = body(&mut *backend);
    if let Err(e) = &result {
        error!(prefix, error = %e, "failure hook triggered");
        on_failure(backend, ctx, prefix);
    }
    result
}

/// Built-in catalog plus the flow's own screens
fn screen_table(flow: &FlowConfig) -> HashMap<String, ScreenState> {
    catalog::all()
        .into_iter()
        .chain(flow.screens.iter().cloned())
        .map(|s| (s.name.clone(), s))
        .collect()
}

/// Execute a flow in a fresh session from `factory`
pub fn run_flow<F: SessionFactory>(
    flow: &FlowConfig,
    factory: &mut F,
    ctx: &mut RunContext<'_>,
) -> HarnessResult<FlowResult> {
    let screens = screen_table(flow);
    for name in flow.steps.iter().filter_map(FlowStep::screen) {
        lookup(flow, &screens, name)?;
    }

    let started_at = Utc::now();
    let mut session = DeviceSession::open(factory, ctx.app_package.clone())?;
    let session_id = session.id().to_string();
    info!(flow = %flow.name, session = %session_id, steps = flow.steps.len(), "flow started");

    let mut records: Vec<StepRecord> = flow
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| StepRecord::new(i, step.label(), StepStatus::NotRun))
        .collect();

    let (outcome, diagnostics) = {
        let backend = session.backend_mut()?;
        let outcome = execute(flow, &screens, backend, ctx, &mut records);
        let diagnostics = match &outcome {
            Ok(()) => None,
            Err(e) => {
                error!(flow = %flow.name, error = %e, "flow failed");
                Some(on_failure(backend, ctx, &format!("{}_fail", flow.name)))
            }
        };
        (outcome, diagnostics)
    };
    session.release();

    let success = outcome.is_ok();
    if success {
        info!(flow = %flow.name, "flow passed");
    }
    Ok(FlowResult {
        flow: flow.name.clone(),
        session_id,
        host: host_name(),
        success,
        error: outcome.err().map(|e| error_chain(&e)),
        steps: records,
        diagnostics,
        started_at,
        finished_at: Utc::now(),
    })
}

fn execute(
    flow: &FlowConfig,
    screens: &HashMap<String, ScreenState>,
    backend: &mut dyn UiBackend,
    ctx: &mut RunContext<'_>,
    records: &mut [StepRecord],
) -> HarnessResult<()> {
    for command in &flow.launch {
        info!(command = %command.name, args = ?command.args, "launch");
        backend
            .run_privileged_command(&command.name, &command.args)
            .map_err(|source| HarnessError::Launch {
                command: command.name.clone(),
                source,
            })?;
    }

    for (index, step) in flow.steps.iter().enumerate() {
        let record = &mut records[index];
        info!(step = index, label = %record.label, "step");

        match step {
            FlowStep::WaitLoaded {
                screen,
                timeout_ms,
                optional,
                finish_if_loaded,
                capture,
            } => {
                let state = lookup(flow, screens, screen)?;
                let poller = Poller::new(ctx.options, ctx.clock);
                let loaded = match timeout_ms {
                    Some(ms) => {
                        let step_budget = ctx.options.with_timeout(Duration::from_millis(*ms));
                        state.wait_loaded_within(backend, &poller.with_options(step_budget))
                    }
                    None => state.wait_loaded(backend, &poller),
                };

                match loaded {
                    Ok(outcome) => {
                        record.status = StepStatus::Passed;
                        record.ticks = Some(outcome.ticks());
                        record.elapsed_ms = Some(outcome.elapsed().as_millis() as u64);
                        if let Some(prefix) = capture {
                            record.artifacts = capture_paths(backend, ctx, prefix);
                        }
                        if *finish_if_loaded {
                            info!(screen = %screen, "target screen reached, finishing early");
                            return Ok(());
                        }
                    }
                    Err(e @ ScreenError::NotLoaded { .. }) if *optional => {
                        warn!(screen = %screen, "optional screen not loaded, continuing");
                        record.status = StepStatus::Skipped;
                        record.detail = Some(error_chain(&e).join(": "));
                    }
                    Err(e) => {
                        record.status = StepStatus::Failed;
                        record.detail = Some(error_chain(&e).join(": "));
                        return Err(e.into());
                    }
                }
            }

            FlowStep::Perform {
                screen,
                transition,
                params,
            } => {
                let state = lookup(flow, screens, screen)?;
                let poller = Poller::new(ctx.options, ctx.clock);

                match state.perform(backend, transition, params, &poller) {
                    Ok(next) => {
                        record.status = StepStatus::Passed;
                        record.detail = next.map(|n| format!("next: {}", n));
                    }
                    Err(e) => {
                        record.status = StepStatus::Failed;
                        record.detail = Some(error_chain(&e).join(": "));
                        return Err(e.into());
                    }
                }
            }

            FlowStep::Capture { prefix } => {
                record.artifacts = capture_paths(backend, ctx, prefix);
                record.status = StepStatus::Passed;
            }
        }
    }
    Ok(())
}

fn lookup<'s>(
    flow: &FlowConfig,
    screens: &'s HashMap<String, ScreenState>,
    name: &str,
) -> HarnessResult<&'s ScreenState> {
    screens.get(name).ok_or_else(|| HarnessError::UnknownScreen {
        flow: flow.name.clone(),
        screen: name.to_string(),
    })
}

fn capture_paths(
    backend: &mut dyn UiBackend,
    ctx: &mut RunContext<'_>,
    prefix: &str,
) -> Vec<std::path::PathBuf> {
    let bundle = diagnostics::capture(backend, ctx.sink, prefix, ctx.text_limit);
    bundle
        .screenshot_path
        .into_iter()
        .chain(bundle.tree_path)
        .collect()
}

/// Display of an error and each of its sources, outermost first
pub fn error_chain(err: &dyn std::error::Error) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        chain.push(e.to_string());
        source = e.source();
    }
    chain
}

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::catalog::{NETWORK_INTERNET, SETTINGS_MAIN};
    use crate::session::MockFactory;
    use crate::snapshot::backend::MockDevice;
    use crate::snapshot::types::{UiNode, UiTree};
    use crate::sync::clock::{Clock, ManualClock};
    use std::io;
    use std::path::PathBuf;

    #[derive(Default)]
    struct MemorySink {
        files: Vec<String>,
    }

    impl ArtifactSink for MemorySink {
        fn persist_image(&mut self, _bytes: &[u8], file_name: &str) -> io::Result<PathBuf> {
            self.files.push(file_name.to_string());
            Ok(PathBuf::from(file_name))
        }

        fn persist_text(&mut self, _text: &str, file_name: &str) -> io::Result<PathBuf> {
            self.files.push(file_name.to_string());
            Ok(PathBuf::from(file_name))
        }
    }

    fn list(labels: &[&str]) -> UiTree {
        UiTree::new(vec![
            UiNode::new("android.widget.ListView")
                .scrollable(true)
                .children(labels.iter().map(|l| UiNode::text_view(*l))),
        ])
    }

    #[test]
    fn test_error_chain_walks_sources() {
        let err = crate::sync::types::SyncError::TimedOut {
            what: "x".into(),
            timeout: Duration::from_secs(1),
            last_error: crate::sync::types::NotFound::new("text(\"a\")", "absent"),
        };
        let chain = error_chain(&err);
        assert_eq!(chain.len(), 2);
        assert!(chain[1].contains("absent"));
    }

    #[test]
    fn test_unknown_screen_rejected_before_acquire() {
        let flow = FlowConfig {
            name: "bad".into(),
            launch: vec![],
            steps: vec![FlowStep::wait("nowhere")],
            screens: vec![],
        };
        let mut factory = MockFactory::new(|| MockDevice::new(vec![]));
        let clock = ManualClock::new();
        let mut sink = MemorySink::default();
        let mut out = Vec::new();
        let mut ctx = RunContext {
            clock: &clock,
            options: WaitOptions::default(),
            sink: &mut sink,
            text_limit: 60,
            encoding: OutputEncoding::Utf8,
            out: &mut out,
            app_package: None,
        };
        let err = run_flow(&flow, &mut factory, &mut ctx).unwrap_err();
        assert!(matches!(err, HarnessError::UnknownScreen { .. }));
        assert_eq!(
            err.to_string(),
            "flow \"bad\" refers to unknown screen \"nowhere\""
        );
        assert_eq!(factory.acquired(), 0);
    }

    #[test]
    fn test_optional_fast_path_finishes_early() {
        let flow = FlowConfig {
            name: "open_settings".into(),
            launch: vec![],
            steps: vec![
                FlowStep::WaitLoaded {
                    screen: NETWORK_INTERNET.into(),
                    timeout_ms: Some(1_000),
                    optional: true,
                    finish_if_loaded: true,
                    capture: Some("settings_direct_ok".into()),
                },
                FlowStep::wait(SETTINGS_MAIN),
            ],
            screens: vec![],
        };
        let mut factory = MockFactory::new(|| MockDevice::new(vec![list(&["Wi-Fi"])]));
        let clock = ManualClock::new();
        let mut sink = MemorySink::default();
        let mut out = Vec::new();
        let mut ctx = RunContext {
            clock: &clock,
            options: WaitOptions::default(),
            sink: &mut sink,
            text_limit: 60,
            encoding: OutputEncoding::Utf8,
            out: &mut out,
            app_package: None,
        };

        let result = run_flow(&flow, &mut factory, &mut ctx).unwrap();
        assert!(result.success);
        assert_eq!(result.steps[0].status, StepStatus::Passed);
        assert_eq!(result.steps[0].artifacts.len(), 2);
        assert_eq!(result.steps[1].status, StepStatus::NotRun);
        assert!(sink.files.iter().all(|f| f.starts_with("settings_direct_ok_")));
    }

    #[test]
    fn test_step_timeout_beats_screen_timeout() {
        let flow = FlowConfig {
            name: "form".into(),
            launch: vec![],
            steps: vec![
                FlowStep::WaitLoaded {
                    screen: catalog::PRACTICE_FORM.into(),
                    timeout_ms: Some(2_000),
                    optional: true,
                    finish_if_loaded: false,
                    capture: None,
                },
                FlowStep::WaitLoaded {
                    screen: catalog::PRACTICE_FORM.into(),
                    timeout_ms: None,
                    optional: true,
                    finish_if_loaded: false,
                    capture: None,
                },
            ],
            screens: vec![],
        };
        let mut factory = MockFactory::new(|| MockDevice::new(vec![list(&["Loading"])]));
        let clock = ManualClock::new();
        let mut sink = MemorySink::default();
        let mut out = Vec::new();
        let mut ctx = RunContext {
            clock: &clock,
            options: WaitOptions::new(Duration::from_secs(20), Duration::from_millis(500)),
            sink: &mut sink,
            text_limit: 60,
            encoding: OutputEncoding::Utf8,
            out: &mut out,
            app_package: None,
        };

        let result = run_flow(&flow, &mut factory, &mut ctx).unwrap();
        assert!(result.success);
        assert_eq!(result.steps[0].status, StepStatus::Skipped);
        assert!(result.steps[0].detail.as_deref().unwrap().contains("2s"));
        assert_eq!(result.steps[1].status, StepStatus::Skipped);
        // 2s step budget, then the form's own 10s
        assert_eq!(clock.now(), Duration::from_secs(12));
    }

    #[test]
    fn test_run_guarded_passes_error_through() {
        let mut device = MockDevice::new(vec![list(&["Battery"])]);
        let clock = ManualClock::new();
        let mut sink = MemorySink::default();
        let mut out = Vec::new();
        let mut ctx = RunContext {
            clock: &clock,
            options: WaitOptions::default(),
            sink: &mut sink,
            text_limit: 60,
            encoding: OutputEncoding::Utf8,
            out: &mut out,
            app_package: None,
        };

        let ok: Result<u8, String> = run_guarded(&mut device, &mut ctx, "custom", |_| Ok(7));
        assert_eq!(ok, Ok(7));
        let err: Result<u8, String> =
            run_guarded(&mut device, &mut ctx, "custom_fail", |_| Err("boom".to_string()));
        assert_eq!(err, Err("boom".to_string()));

        assert_eq!(sink.files.len(), 2);
        let dump = String::from_utf8(out).unwrap();
        assert!(dump.contains("\"Battery\""));
    }
}
