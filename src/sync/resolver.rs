//! Multi-candidate resolution.

use crate::snapshot::backend::UiBackend;
use crate::snapshot::types::{BackendResult, NodeHandle};
use crate::sync::locator::AnchorSet;
use crate::sync::poller::Poller;
use crate::sync::types::WaitOutcome;

/// Wait until any candidate of `candidates` is present.
///
/// Each tick queries the tree once and scans candidates in order against it;
/// the first hit on that tick wins. On timeout the outcome carries the
/// `NotFound` of the last candidate checked.
pub fn resolve_any(
    backend: &mut dyn UiBackend,
    candidates: &AnchorSet,
    poller: &Poller<'_>,
) -> BackendResult<WaitOutcome<NodeHandle>> {
    let what = candidates.to_string();
    poller.poll(&what, || {
        let tree = backend.query_tree()?;
        Ok(candidates.first_match(&tree)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::backend::MockDevice;
    use crate::snapshot::types::{UiNode, UiTree};
    use crate::sync::clock::ManualClock;
    use crate::sync::types::WaitOptions;
    use std::time::Duration;

    fn screen(labels: &[&str]) -> UiTree {
        UiTree::new(vec![
            UiNode::new("android.widget.FrameLayout")
                .children(labels.iter().map(|l| UiNode::text_view(*l))),
        ])
    }

    #[test]
    fn test_any_member_resolves_regardless_of_order() {
        let clock = ManualClock::new();
        let poller = Poller::new(WaitOptions::default(), &clock);
        for order in [["Apps", "Battery"], ["Battery", "Apps"]] {
            let mut device = MockDevice::new(vec![screen(&["Battery"])]);
            let outcome =
                resolve_any(&mut device, &AnchorSet::text_contains(order), &poller).unwrap();
            assert_eq!(outcome.value().unwrap().node.text, "Battery");
            assert_eq!(outcome.ticks(), 1);
        }
    }

    #[test]
    fn test_one_tree_query_per_tick() {
        let clock = ManualClock::new();
        let poller = Poller::new(
            WaitOptions::new(Duration::from_secs(2), Duration::from_millis(500)),
            &clock,
        );
        let mut device = MockDevice::new(vec![screen(&["Loading"])]);
        let outcome = resolve_any(
            &mut device,
            &AnchorSet::text_contains(["Wi-Fi", "SIMs", "Internet"]),
            &poller,
        )
        .unwrap();

        assert!(!outcome.is_resolved());
        assert_eq!(device.queries(), outcome.ticks() as usize);
        match outcome {
            WaitOutcome::TimedOut { last_error, .. } => {
                assert_eq!(last_error.locator, "textContains(\"Internet\")")
            }
            _ => unreachable!(),
        }
    }
}
