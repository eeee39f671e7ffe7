//! Built-in screens.
//!
//! Android Settings anchors cover several OS versions and OEM skins; any one
//! of them is enough to call the screen loaded.

use std::time::Duration;

use super::types::{ScreenState, TargetSpec, Transition, TransitionAction};
use crate::sync::locator::{AnchorSet, Locator};

pub const SETTINGS_MAIN: &str = "settings_main";
pub const NETWORK_INTERNET: &str = "network_internet";
pub const INTERNET: &str = "internet";
pub const PRACTICE_FORM: &str = "practice_form";
pub const FORM_SUBMITTED: &str = "form_submitted";

/// Intent that opens the Settings app
pub const SETTINGS_INTENT: &str = "android.settings.SETTINGS";

pub const PRACTICE_FORM_URL: &str = "https://demoqa.com/automation-practice-form";

/// List item title id shared by every Settings entry
const SETTINGS_TITLE_ID: &str = "android:id/title";

/// Form waits are shorter than the configured device default
const FORM_TIMEOUT: Duration = Duration::from_secs(10);

fn click(name: &str, target: TargetSpec, next: Option<&str>) -> Transition {
    Transition {
        name: name.to_string(),
        target,
        action: TransitionAction::Click,
        next: next.map(str::to_string),
    }
}

fn enter(name: &str, id: &str, param: &str, commit: bool) -> Transition {
    Transition {
        name: name.to_string(),
        target: TargetSpec::new(AnchorSet::single(Locator::id(id))).with_settle(FORM_TIMEOUT),
        action: TransitionAction::Enter {
            param: param.to_string(),
            commit,
        },
        next: None,
    }
}

pub fn settings_main() -> ScreenState {
    ScreenState::new(
        SETTINGS_MAIN,
        AnchorSet::text_contains([
            "Network & internet",
            "Connected devices",
            "Apps",
            "Notifications",
            "Battery",
            "Storage",
            "Search Settings",
        ]),
    )
    .with_transition(click(
        "open_network_and_internet",
        TargetSpec::new(AnchorSet::text_contains(["Network & internet"])).with_scroll(true),
        Some(NETWORK_INTERNET),
    ))
}

pub fn network_internet() -> ScreenState {
    ScreenState::new(
        NETWORK_INTERNET,
        AnchorSet::text_contains(["Network & internet", "Internet", "Wi-Fi", "Mobile network"]),
    )
    .with_transition(click(
        "open_internet",
        TargetSpec::new(AnchorSet::single(Locator::id_text(
            SETTINGS_TITLE_ID,
            "Internet",
        ))),
        Some(INTERNET),
    ))
}

pub fn internet() -> ScreenState {
    ScreenState::new(
        INTERNET,
        // Some builds render Wi-Fi with a non-breaking hyphen
        AnchorSet::text_contains(["Internet", "Wi\u{2011}Fi", "Wi-Fi", "Mobile data", "SIMs"]),
    )
}

pub fn practice_form() -> ScreenState {
    ScreenState::new(PRACTICE_FORM, AnchorSet::single(Locator::id("firstName")))
        .with_timeout(FORM_TIMEOUT)
        .with_transition(enter("first_name", "firstName", "first_name", false))
        .with_transition(enter("last_name", "lastName", "last_name", false))
        .with_transition(enter("email", "userEmail", "email", false))
        .with_transition(click(
            "gender_male",
            TargetSpec::new(AnchorSet::single(Locator::text("Male"))).with_settle(FORM_TIMEOUT),
            None,
        ))
        .with_transition(enter("mobile", "userNumber", "mobile", false))
        .with_transition(enter("subject", "subjectsInput", "subject", true))
        .with_transition(click(
            "hobby_sports",
            TargetSpec::new(AnchorSet::single(Locator::text("Sports"))).with_settle(FORM_TIMEOUT),
            None,
        ))
        .with_transition(enter("picture", "uploadPicture", "picture", false))
        .with_transition(enter("address", "currentAddress", "address", false))
        .with_transition(enter("state", "react-select-3-input", "state", true))
        .with_transition(enter("city", "react-select-4-input", "city", true))
        .with_transition(Transition {
            name: "submit".to_string(),
            target: TargetSpec::new(AnchorSet::single(Locator::id("submit")))
                .with_scroll(true)
                .with_reveal(true)
                .with_settle(FORM_TIMEOUT),
            action: TransitionAction::ScriptClick,
            next: Some(FORM_SUBMITTED.to_string()),
        })
}

pub fn form_submitted() -> ScreenState {
    ScreenState::new(
        FORM_SUBMITTED,
        AnchorSet::new(vec![
            Locator::id("example-modal-sizes-title-lg"),
            Locator::text_contains("Thanks for submitting the form"),
        ]),
    )
    .with_timeout(FORM_TIMEOUT)
}

/// Every built-in screen
pub fn all() -> Vec<ScreenState> {
    vec![
        settings_main(),
        network_internet(),
        internet(),
        practice_form(),
        form_submitted(),
    ]
}

/// Look up a built-in screen by name
pub fn by_name(name: &str) -> Option<ScreenState> {
    all().into_iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_point_at_known_screens() {
        let names: Vec<String> = all().into_iter().map(|s| s.name).collect();
        for screen in all() {
            assert!(!screen.anchors.is_empty(), "{} has no anchors", screen.name);
            for t in &screen.transitions {
                assert!(!t.target.candidates.is_empty(), "{}.{}", screen.name, t.name);
                if let Some(next) = &t.next {
                    assert!(names.contains(next), "{}.{} -> {}", screen.name, t.name, next);
                }
            }
        }
    }

    #[test]
    fn test_settings_entry_scrolls() {
        let main = settings_main();
        let open = main.transition("open_network_and_internet").unwrap();
        assert!(open.target.scroll);
        assert_eq!(open.next.as_deref(), Some(NETWORK_INTERNET));
    }

    #[test]
    fn test_internet_item_uses_id_and_text() {
        let net = network_internet();
        let open = net.transition("open_internet").unwrap();
        assert_eq!(
            open.target.candidates.candidates[0],
            Locator::id_text("android:id/title", "Internet")
        );
    }

    #[test]
    fn test_submit_always_reveals_then_script_clicks() {
        let form = practice_form();
        let submit = form.transition("submit").unwrap();
        assert!(submit.target.reveal);
        assert_eq!(submit.action, TransitionAction::ScriptClick);
        assert_eq!(submit.next.as_deref(), Some(FORM_SUBMITTED));
    }

    #[test]
    fn test_by_name() {
        assert_eq!(by_name("internet").unwrap().anchors.len(), 5);
        assert!(by_name("missing").is_none());
    }
}
