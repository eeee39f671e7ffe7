//! Built-in flows for the bundled screen catalog.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::harness::types::{FlowConfig, FlowStep, LaunchCommand};
use crate::screen::catalog::{
    FORM_SUBMITTED, INTERNET, NETWORK_INTERNET, PRACTICE_FORM, PRACTICE_FORM_URL, SETTINGS_INTENT,
    SETTINGS_MAIN,
};

/// Fast-path budget for a device that restores the last Settings page
const DIRECT_PATH_TIMEOUT_MS: u64 = 3_000;

/// Smallest byte sequence the upload field accepts as a PNG
const SAMPLE_PICTURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Names accepted by [`by_name`]
pub const NAMES: &[&str] = &["open-settings", "open-internet", "practice-form"];

fn launch_settings() -> LaunchCommand {
    LaunchCommand::new("am", &["start", "-a", SETTINGS_INTENT])
}

/// Open Settings and reach "Network & internet".
///
/// Settings may resume directly on the network page; in that case the flow
/// captures `settings_direct_ok` and finishes early.
pub fn open_settings() -> FlowConfig {
    FlowConfig {
        name: "settings".to_string(),
        launch: vec![launch_settings()],
        steps: vec![
            FlowStep::WaitLoaded {
                screen: NETWORK_INTERNET.to_string(),
                timeout_ms: Some(DIRECT_PATH_TIMEOUT_MS),
                optional: true,
                finish_if_loaded: true,
                capture: Some("settings_direct_ok".to_string()),
            },
            FlowStep::wait(SETTINGS_MAIN),
            FlowStep::perform(SETTINGS_MAIN, "open_network_and_internet"),
            FlowStep::wait(NETWORK_INTERNET),
            FlowStep::capture("settings_ok"),
        ],
        screens: Vec::new(),
    }
}

/// Open Settings and walk to the Internet page
pub fn open_internet() -> FlowConfig {
    FlowConfig {
        name: "internet".to_string(),
        launch: vec![launch_settings()],
        steps: vec![
            FlowStep::wait(SETTINGS_MAIN),
            FlowStep::perform(SETTINGS_MAIN, "open_network_and_internet"),
            FlowStep::wait(NETWORK_INTERNET),
            FlowStep::perform(NETWORK_INTERNET, "open_internet"),
            FlowStep::wait(INTERNET),
        ],
        screens: Vec::new(),
    }
}

/// Fill and submit the DemoQA practice form
pub fn practice_form(picture: &Path) -> FlowConfig {
    let picture = picture.to_string_lossy();
    let fields = [
        ("first_name", "Ivan"),
        ("last_name", "Petrov"),
        ("email", "ivanpetrov@example.com"),
    ];

    let mut steps = vec![FlowStep::wait(PRACTICE_FORM)];
    steps.extend(
        fields
            .iter()
            .map(|(field, value)| FlowStep::enter(PRACTICE_FORM, field, field, value)),
    );
    steps.extend([
        FlowStep::perform(PRACTICE_FORM, "gender_male"),
        FlowStep::enter(PRACTICE_FORM, "mobile", "mobile", "7599172463"),
        FlowStep::enter(PRACTICE_FORM, "subject", "subject", "Maths"),
        FlowStep::perform(PRACTICE_FORM, "hobby_sports"),
        FlowStep::enter(PRACTICE_FORM, "picture", "picture", &picture),
        FlowStep::enter(PRACTICE_FORM, "address", "address", "Test address 123"),
        FlowStep::enter(PRACTICE_FORM, "state", "state", "NCR"),
        FlowStep::enter(PRACTICE_FORM, "city", "city", "Delhi"),
        FlowStep::perform(PRACTICE_FORM, "submit"),
        FlowStep::wait(FORM_SUBMITTED),
        FlowStep::capture("form_ok"),
    ]);

    FlowConfig {
        name: "form".to_string(),
        launch: vec![LaunchCommand::new("navigate", &[PRACTICE_FORM_URL])],
        steps,
        screens: Vec::new(),
    }
}

/// Write the upload fixture into `dir` unless it already exists
pub fn ensure_sample_picture(dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join("sample_pic.png");
    if !path.exists() {
        fs::create_dir_all(dir)?;
        fs::write(&path, SAMPLE_PICTURE)?;
    }
    Ok(path)
}

/// Look up a built-in flow by its CLI name
pub fn by_name(name: &str, fixtures: &Path) -> io::Result<Option<FlowConfig>> {
    Ok(match name {
        "open-settings" => Some(open_settings()),
        "open-internet" => Some(open_internet()),
        "practice-form" => Some(practice_form(&ensure_sample_picture(fixtures)?)),
        _ => None,
    })
}
