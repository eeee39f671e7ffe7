//! Screen-state operations.
//!
//! `wait_loaded` and `perform` are deliberately separate: a transition never
//! waits for the screen it lands on. Flows chain them explicitly.

use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use super::types::{ScreenError, ScreenResult, ScreenState, Transition, TransitionAction};
use crate::snapshot::backend::{ActionKind, ScrollSpec, UiBackend};
use crate::snapshot::types::NodeHandle;
use crate::sync::locator::AnchorSet;
use crate::sync::poller::Poller;
use crate::sync::resolver::resolve_any;
use crate::sync::scroll::{locate_any_with_scroll, locate_with_scroll, scroll_search};
use crate::sync::types::{SyncError, SyncResult, WaitOutcome};

impl ScreenState {
    pub fn new(name: impl Into<String>, anchors: AnchorSet) -> Self {
        Self {
            name: name.into(),
            anchors,
            transitions: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn transition(&self, name: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.name == name)
    }

    /// Poll until any anchor is present, within this screen's own timeout
    /// if it has one and the poller's budget otherwise.
    ///
    /// A timeout becomes [`ScreenError::NotLoaded`] chaining the
    /// [`SyncError::TimedOut`] and its last `NotFound`.
    pub fn wait_loaded(
        &self,
        backend: &mut dyn UiBackend,
        poller: &Poller<'_>,
    ) -> ScreenResult<WaitOutcome<NodeHandle>> {
        match self.timeout() {
            Some(timeout) => {
                let poller = poller.with_options(poller.options().with_timeout(timeout));
                self.wait_loaded_within(backend, &poller)
            }
            None => self.wait_loaded_within(backend, poller),
        }
    }

    /// Like [`ScreenState::wait_loaded`], but the poller's budget wins over
    /// the screen's timeout
    pub fn wait_loaded_within(
        &self,
        backend: &mut dyn UiBackend,
        poller: &Poller<'_>,
    ) -> ScreenResult<WaitOutcome<NodeHandle>> {
        match resolve_any(backend, &self.anchors, poller)? {
            WaitOutcome::TimedOut { last_error, .. } => Err(ScreenError::NotLoaded {
                screen: self.name.clone(),
                source: SyncError::TimedOut {
                    what: format!("screen {:?} anchors {}", self.name, self.anchors),
                    timeout: poller.options().timeout,
                    last_error,
                },
            }),
            resolved => {
                if let Some(anchor) = resolved.value() {
                    info!(screen = %self.name, anchor = %anchor.locator, ticks = resolved.ticks(), "screen loaded");
                }
                Ok(resolved)
            }
        }
    }

    /// Resolve a transition's target, act on it, and return the name of the
    /// expected next screen
    pub fn perform(
        &self,
        backend: &mut dyn UiBackend,
        name: &str,
        params: &HashMap<String, String>,
        poller: &Poller<'_>,
    ) -> ScreenResult<Option<String>> {
        let transition = self
            .transition(name)
            .ok_or_else(|| ScreenError::UnknownTransition {
                screen: self.name.clone(),
                transition: name.to_string(),
            })?;

        // Validate before touching the device
        let typed = match &transition.action {
            TransitionAction::Click | TransitionAction::ScriptClick => None,
            TransitionAction::Enter { param, commit } => {
                let value = params.get(param).ok_or_else(|| ScreenError::MissingParam {
                    transition: name.to_string(),
                    param: param.clone(),
                })?;
                Some((value.clone(), *commit))
            }
        };

        let handle = resolve_target(backend, transition, poller).map_err(|e| match e {
            SyncError::Backend(fault) => ScreenError::Backend(fault),
            source => ScreenError::TransitionFailed {
                screen: self.name.clone(),
                transition: name.to_string(),
                source,
            },
        })?;

        if transition.target.reveal {
            backend.gesture(&ScrollSpec::into_view(handle.locator.clone()))?;
        }

        match typed {
            None if transition.action == TransitionAction::ScriptClick => {
                backend.act(&handle, &ActionKind::ScriptClick)?
            }
            None => backend.act(&handle, &ActionKind::Click)?,
            Some((text, commit)) => {
                backend.act(&handle, &ActionKind::Type(text))?;
                if commit {
                    backend.act(&handle, &ActionKind::CommitKey)?;
                }
            }
        }

        info!(
            screen = %self.name,
            transition = name,
            target = %handle.locator,
            next = transition.next.as_deref().unwrap_or("-"),
            "transition performed"
        );
        Ok(transition.next.clone())
    }
}

fn resolve_target(
    backend: &mut dyn UiBackend,
    transition: &Transition,
    poller: &Poller<'_>,
) -> SyncResult<NodeHandle> {
    let target = &transition.target;

    let Some(settle) = target.settle() else {
        return locate_any_with_scroll(backend, &target.candidates, target.scroll);
    };

    let settle_poller = poller.with_options(poller.options().with_timeout(settle));
    match resolve_any(backend, &target.candidates, &settle_poller)? {
        // Present in the tree; fetch a live handle for the matching variant
        WaitOutcome::Resolved { value, .. } => {
            locate_with_scroll(backend, &value.locator, target.scroll)
        }
        WaitOutcome::TimedOut { last_error, .. } if target.scroll => {
            scroll_search(backend, &target.candidates, last_error)
        }
        WaitOutcome::TimedOut { last_error, .. } => Err(SyncError::TimedOut {
            what: format!("target {}", target.candidates),
            timeout: settle,
            last_error,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::types::TargetSpec;
    use crate::snapshot::backend::{MockDevice, MockEvent};
    use crate::snapshot::types::{BackendResult, UiNode, UiTree};
    use crate::sync::clock::{Clock, ManualClock};
    use crate::sync::locator::Locator;
    use crate::sync::types::{LookupError, NotFound, WaitOptions};
    use std::error::Error;

    /// Target is in the tree but native lookups miss it until a scroll
    struct Offscreen {
        inner: MockDevice,
        scrolled: bool,
    }

    impl UiBackend for Offscreen {
        fn source_type(&self) -> &str {
            self.inner.source_type()
        }

        fn query_tree(&mut self) -> BackendResult<UiTree> {
            self.inner.query_tree()
        }

        fn query_screenshot(&mut self) -> BackendResult<Vec<u8>> {
            self.inner.query_screenshot()
        }

        fn find(&mut self, locator: &Locator) -> Result<NodeHandle, LookupError> {
            if !self.scrolled {
                return Err(NotFound::new(locator.to_string(), "outside viewport").into());
            }
            self.inner.find(locator)
        }

        fn act(&mut self, node: &NodeHandle, action: &ActionKind) -> BackendResult<()> {
            self.inner.act(node, action)
        }

        fn gesture(&mut self, spec: &ScrollSpec) -> BackendResult<()> {
            self.scrolled = true;
            self.inner.gesture(spec)
        }

        fn run_privileged_command(
            &mut self,
            name: &str,
            args: &[String],
        ) -> BackendResult<serde_json::Value> {
            self.inner.run_privileged_command(name, args)
        }
    }

    fn settled_submit(scroll: bool) -> ScreenState {
        ScreenState::new("form", AnchorSet::single(Locator::id("firstName"))).with_transition(
            Transition {
                name: "submit".into(),
                target: TargetSpec::new(AnchorSet::single(Locator::id("submit")))
                    .with_settle(Duration::from_secs(1))
                    .with_scroll(scroll),
                action: TransitionAction::Click,
                next: None,
            },
        )
    }

    fn screen(labels: &[&str]) -> UiTree {
        UiTree::new(vec![
            UiNode::new("androidx.recyclerview.widget.RecyclerView")
                .scrollable(true)
                .children(labels.iter().map(|l| UiNode::text_view(*l))),
        ])
    }

    fn form() -> UiTree {
        UiTree::new(vec![
            UiNode::new("form")
                .child(UiNode::new("input").with_id("firstName"))
                .child(UiNode::new("button").with_id("submit").with_text("Submit")),
        ])
    }

    fn settings() -> ScreenState {
        ScreenState::new("settings", AnchorSet::text_contains(["Apps", "Battery"])).with_transition(
            Transition {
                name: "open_network".into(),
                target: TargetSpec::new(AnchorSet::text_contains(["Network & internet"]))
                    .with_scroll(true),
                action: TransitionAction::Click,
                next: Some("network".into()),
            },
        )
    }

    fn poller_opts() -> WaitOptions {
        WaitOptions::new(Duration::from_secs(2), Duration::from_millis(500))
    }

    #[test]
    fn test_wait_loaded_resolves() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let mut device = MockDevice::new(vec![screen(&[]), screen(&["Battery"])]);
        let outcome = settings().wait_loaded(&mut device, &poller).unwrap();
        assert_eq!(outcome.ticks(), 2);
    }

    #[test]
    fn test_not_loaded_chains_sources() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let mut device = MockDevice::new(vec![screen(&["Loading"])]);
        let err = settings().wait_loaded(&mut device, &poller).unwrap_err();

        assert!(matches!(err, ScreenError::NotLoaded { ref screen, .. } if screen == "settings"));
        let timed_out = err.source().unwrap();
        assert!(timed_out.to_string().starts_with("timed out after 2s"));
        let not_found = timed_out.source().unwrap();
        assert!(not_found.to_string().contains("textContains(\"Battery\")"));
    }

    #[test]
    fn test_perform_clicks_after_scroll_and_returns_next() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let mut device = MockDevice::new(vec![screen(&["Apps"])])
            .with_scroll_reveal(screen(&["Network & internet"]));

        let next = settings()
            .perform(&mut device, "open_network", &HashMap::new(), &poller)
            .unwrap();
        assert_eq!(next.as_deref(), Some("network"));
        assert_eq!(device.gesture_count(), 1);
        assert!(device.events().iter().any(|e| matches!(
            e,
            MockEvent::Act { text, action: ActionKind::Click, .. } if text == "Network & internet"
        )));
    }

    #[test]
    fn test_perform_does_not_wait_for_next_screen() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let mut device = MockDevice::new(vec![screen(&["Network & internet"])]);
        settings()
            .perform(&mut device, "open_network", &HashMap::new(), &poller)
            .unwrap();
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn test_enter_types_then_commits() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let state = ScreenState::new("form", AnchorSet::single(Locator::id("submit")))
            .with_transition(Transition {
                name: "first_name".into(),
                target: TargetSpec::new(AnchorSet::single(Locator::id("firstName")))
                    .with_settle(Duration::from_secs(1)),
                action: TransitionAction::Enter {
                    param: "first_name".into(),
                    commit: true,
                },
                next: None,
            });
        let mut device = MockDevice::new(vec![form()]);
        let params = HashMap::from([("first_name".to_string(), "Ada".to_string())]);

        assert_eq!(state.perform(&mut device, "first_name", &params, &poller).unwrap(), None);
        let actions: Vec<ActionKind> = device
            .events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Act { action, .. } => Some(action),
                _ => None,
            })
            .collect();
        assert_eq!(
            actions,
            vec![ActionKind::Type("Ada".into()), ActionKind::CommitKey]
        );
    }

    #[test]
    fn test_typed_errors_before_any_device_call() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let state = ScreenState::new("form", AnchorSet::single(Locator::id("submit")))
            .with_transition(Transition {
                name: "first_name".into(),
                target: TargetSpec::new(AnchorSet::single(Locator::id("firstName"))),
                action: TransitionAction::Enter {
                    param: "first_name".into(),
                    commit: false,
                },
                next: None,
            });
        let mut device = MockDevice::new(vec![form()]);

        assert!(matches!(
            state.perform(&mut device, "nope", &HashMap::new(), &poller),
            Err(ScreenError::UnknownTransition { .. })
        ));
        assert!(matches!(
            state.perform(&mut device, "first_name", &HashMap::new(), &poller),
            Err(ScreenError::MissingParam { ref param, .. }) if param == "first_name"
        ));
        assert!(device.events().is_empty());
    }

    #[test]
    fn test_transition_failed_keeps_escalation() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let mut device = MockDevice::new(vec![screen(&["Apps"])]);
        let err = settings()
            .perform(&mut device, "open_network", &HashMap::new(), &poller)
            .unwrap_err();
        match err {
            ScreenError::TransitionFailed { source, .. } => assert!(matches!(
                source,
                SyncError::EscalationExhausted { scrolled: true, .. }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_backend_fault_is_unlabeled() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let mut device = MockDevice::new(vec![screen(&["Apps"])]).with_fault_at(0);
        let err = settings().wait_loaded(&mut device, &poller).unwrap_err();
        assert!(matches!(err, ScreenError::Backend(_)));
    }

    #[test]
    fn test_screen_timeout_overrides_poller_budget() {
        let clock = ManualClock::new();
        let poller = Poller::new(WaitOptions::new(Duration::from_secs(20), Duration::from_millis(500)), &clock);
        let state = settings().with_timeout(Duration::from_secs(3));
        let mut device = MockDevice::new(vec![screen(&["Loading"])]);

        let err = state.wait_loaded(&mut device, &poller).unwrap_err();
        assert!(err.source().unwrap().to_string().starts_with("timed out after 3s"));
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_wait_loaded_within_keeps_poller_budget() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let state = settings().with_timeout(Duration::from_secs(30));
        let mut device = MockDevice::new(vec![screen(&["Loading"])]);

        state.wait_loaded_within(&mut device, &poller).unwrap_err();
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_settled_target_missed_natively_scrolls_when_allowed() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let mut device = Offscreen {
            inner: MockDevice::new(vec![form()]),
            scrolled: false,
        };

        settled_submit(true)
            .perform(&mut device, "submit", &HashMap::new(), &poller)
            .unwrap();
        assert_eq!(device.inner.gesture_count(), 1);
        assert!(device.inner.events().iter().any(|e| matches!(
            e,
            MockEvent::Act { action: ActionKind::Click, .. }
        )));
    }

    #[test]
    fn test_settled_target_missed_natively_without_scroll() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let mut device = Offscreen {
            inner: MockDevice::new(vec![form()]),
            scrolled: false,
        };

        let err = settled_submit(false)
            .perform(&mut device, "submit", &HashMap::new(), &poller)
            .unwrap_err();
        assert!(matches!(
            err,
            ScreenError::TransitionFailed {
                source: SyncError::EscalationExhausted { scrolled: false, .. },
                ..
            }
        ));
        assert_eq!(device.inner.gesture_count(), 0);
    }

    #[test]
    fn test_reveal_scrolls_visible_target_before_script_click() {
        let clock = ManualClock::new();
        let poller = Poller::new(poller_opts(), &clock);
        let state = ScreenState::new("form", AnchorSet::single(Locator::id("firstName")))
            .with_transition(Transition {
                name: "submit".into(),
                target: TargetSpec::new(AnchorSet::single(Locator::id("submit")))
                    .with_reveal(true)
                    .with_settle(Duration::from_secs(1)),
                action: TransitionAction::ScriptClick,
                next: None,
            });
        let mut device = MockDevice::new(vec![form()]);

        state
            .perform(&mut device, "submit", &HashMap::new(), &poller)
            .unwrap();

        let tail: Vec<MockEvent> = device
            .events()
            .into_iter()
            .filter(|e| matches!(e, MockEvent::Gesture(_) | MockEvent::Act { .. }))
            .collect();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0], MockEvent::Gesture(ScrollSpec::into_view(Locator::id("submit"))));
        assert!(matches!(
            &tail[1],
            MockEvent::Act { action: ActionKind::ScriptClick, text, .. } if text == "Submit"
        ));
    }
}
