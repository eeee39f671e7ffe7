//! WebDriver backend against a stand-in HTTP server.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use httpmock::prelude::*;
use serde_json::json;
use ui_sync::config::{Config, Platform};
use ui_sync::snapshot::webdriver::{COMMIT_KEY, ELEMENT_KEY};
use ui_sync::snapshot::{
    ActionKind, BackendError, ScrollSpec, UiBackend, WebDriverBackend, WebDriverConfig,
};
use ui_sync::session::{DeviceSession, WebDriverFactory};
use ui_sync::sync::{Locator, LookupError, locate_with_scroll};

const SESSION: &str = "5f1c0b7e";

const SETTINGS_SOURCE: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy index="0" class="hierarchy" rotation="0" width="1080" height="2400">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" bounds="[0,0][1080,2400]">
    <node index="0" text="" resource-id="com.android.settings:id/recycler_view" class="androidx.recyclerview.widget.RecyclerView" scrollable="true" bounds="[0,200][1080,2400]">
      <node index="0" text="Network &amp; internet" resource-id="android:id/title" class="android.widget.TextView" bounds="[189,264][567,321]" />
      <node index="1" text="Connected devices" resource-id="android:id/title" class="android.widget.TextView" bounds="[189,450][621,507]" />
    </node>
  </node>
</hierarchy>"#;

fn config(server: &MockServer, platform: Platform) -> WebDriverConfig {
    let mut cfg = WebDriverConfig::from_config(&Config::defaults())
        .with_server_url(server.base_url())
        .with_platform(platform);
    cfg.http_timeout = Duration::from_secs(5);
    cfg
}

fn session_path(suffix: &str) -> String {
    format!("/session/{}{}", SESSION, suffix)
}

/// Register new-session and timeouts endpoints
fn mock_handshake(server: &MockServer, cfg: &WebDriverConfig) {
    server.mock(|when, then| {
        when.method(POST)
            .path("/session")
            .json_body(json!({ "capabilities": { "alwaysMatch": cfg.capabilities() } }));
        then.status(200)
            .json_body(json!({ "value": { "sessionId": SESSION, "capabilities": {} } }));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path(session_path("/timeouts"))
            .json_body(json!({ "implicit": 0 }));
        then.status(200).json_body(json!({ "value": null }));
    });
}

fn connect(server: &MockServer, platform: Platform) -> WebDriverBackend {
    let cfg = config(server, platform);
    mock_handshake(server, &cfg);
    WebDriverBackend::connect(&cfg).unwrap()
}

fn no_such_element() -> serde_json::Value {
    json!({ "value": {
        "error": "no such element",
        "message": "An element could not be located on the page using the given search parameters.",
        "stacktrace": ""
    } })
}

#[test]
fn test_connect_creates_session_without_implicit_wait() {
    let server = MockServer::start();
    let backend = connect(&server, Platform::Android);
    assert_eq!(backend.session_id(), Some(SESSION));
    assert_eq!(backend.source_type(), "android");
}

#[test]
fn test_connect_surfaces_session_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/session");
        then.status(500).json_body(json!({ "value": {
            "error": "session not created",
            "message": "Could not find a connected Android device"
        } }));
    });

    let err = WebDriverBackend::connect(&config(&server, Platform::Android))
        .err()
        .unwrap();
    match err {
        BackendError::Protocol { error, message, .. } => {
            assert_eq!(error, "session not created");
            assert!(message.contains("connected Android device"));
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[test]
fn test_unreachable_server_is_transport_error() {
    let cfg = WebDriverConfig::from_config(&Config::defaults()).with_server_url("http://127.0.0.1:9");
    let err = WebDriverBackend::connect(&cfg).err().unwrap();
    assert!(matches!(err, BackendError::Transport { .. }));
}

#[test]
fn test_page_source_parsed_into_tree() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Android);
    server.mock(|when, then| {
        when.method(GET).path(session_path("/source"));
        then.status(200).json_body(json!({ "value": SETTINGS_SOURCE }));
    });

    let tree = backend.query_tree().unwrap();
    assert_eq!(
        tree.visible_texts(),
        vec!["Network & internet".to_string(), "Connected devices".to_string()]
    );
}

#[test]
fn test_no_such_element_is_not_found() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Android);
    let locator = Locator::text_contains("Bluetooth");
    server.mock(|when, then| {
        when.method(POST).path(session_path("/element")).json_body(json!({
            "using": "-android uiautomator",
            "value": locator.to_ui_automator(),
        }));
        then.status(404).json_body(no_such_element());
    });

    match backend.find(&locator) {
        Err(LookupError::NotFound(e)) => assert_eq!(e.locator, "textContains(\"Bluetooth\")"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_server_error_is_backend_fault() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Android);
    server.mock(|when, then| {
        when.method(POST).path(session_path("/element"));
        then.status(500).json_body(json!({ "value": {
            "error": "unknown error",
            "message": "instrumentation process is not running"
        } }));
    });

    let err = backend.find(&Locator::id("android:id/title")).unwrap_err();
    assert!(matches!(err, LookupError::Backend(BackendError::Protocol { .. })));
}

#[test]
fn test_find_and_type_with_commit() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Web);
    let locator = Locator::id("subjectsInput");
    server.mock(|when, then| {
        when.method(POST).path(session_path("/element")).json_body(json!({
            "using": "xpath",
            "value": locator.to_xpath(),
        }));
        then.status(200).json_body(json!({ "value": { ELEMENT_KEY: "el-7" } }));
    });
    server.mock(|when, then| {
        when.method(GET).path(session_path("/element/el-7/text"));
        then.status(200).json_body(json!({ "value": "" }));
    });
    let typed = server.mock(|when, then| {
        when.method(POST)
            .path(session_path("/element/el-7/value"))
            .json_body(json!({ "text": "Maths", "value": ["M", "a", "t", "h", "s"] }));
        then.status(200).json_body(json!({ "value": null }));
    });
    let committed = server.mock(|when, then| {
        when.method(POST)
            .path(session_path("/element/el-7/value"))
            .json_body(json!({ "text": COMMIT_KEY, "value": [COMMIT_KEY] }));
        then.status(200).json_body(json!({ "value": null }));
    });

    let handle = backend.find(&locator).unwrap();
    assert_eq!(handle.id, "el-7");
    backend.act(&handle, &ActionKind::Type("Maths".into())).unwrap();
    backend.act(&handle, &ActionKind::CommitKey).unwrap();

    typed.assert();
    committed.assert();
}

#[test]
fn test_tree_located_handle_is_refound_before_click() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Android);
    let locator = Locator::id_text("android:id/title", "Network & internet");
    server.mock(|when, then| {
        when.method(GET).path(session_path("/source"));
        then.status(200).json_body(json!({ "value": SETTINGS_SOURCE }));
    });
    let refind = server.mock(|when, then| {
        when.method(POST).path(session_path("/element")).json_body(json!({
            "using": "-android uiautomator",
            "value": locator.to_ui_automator(),
        }));
        then.status(200).json_body(json!({ "value": { ELEMENT_KEY: "el-net" } }));
    });
    let click = server.mock(|when, then| {
        when.method(POST).path(session_path("/element/el-net/click"));
        then.status(200).json_body(json!({ "value": null }));
    });

    let tree = backend.query_tree().unwrap();
    let handle = locator.find_in(&tree).unwrap();
    assert_eq!(handle.id, "0/0/0");
    assert!(handle.is_tree_located());

    backend.act(&handle, &ActionKind::Click).unwrap();
    refind.assert();
    click.assert();
}

#[test]
fn test_numeric_legacy_element_id_is_used_as_is() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Android);
    let locator = Locator::text_contains("Battery");
    let find = server.mock(|when, then| {
        when.method(POST).path(session_path("/element"));
        then.status(200).json_body(json!({ "value": { "ELEMENT": "1" } }));
    });
    server.mock(|when, then| {
        when.method(GET).path(session_path("/element/1/text"));
        then.status(200).json_body(json!({ "value": "Battery" }));
    });
    let click = server.mock(|when, then| {
        when.method(POST).path(session_path("/element/1/click"));
        then.status(200).json_body(json!({ "value": null }));
    });

    let handle = backend.find(&locator).unwrap();
    assert_eq!(handle.id, "1");
    assert!(!handle.is_tree_located());

    backend.act(&handle, &ActionKind::Click).unwrap();
    assert_eq!(find.hits(), 1);
    click.assert();
}

#[test]
fn test_script_click_on_web_runs_in_page() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Web);
    server.mock(|when, then| {
        when.method(POST).path(session_path("/element")).json_body(json!({
            "using": "xpath",
            "value": "//*[@id='submit']",
        }));
        then.status(200).json_body(json!({ "value": { ELEMENT_KEY: "el-submit" } }));
    });
    server.mock(|when, then| {
        when.method(GET).path(session_path("/element/el-submit/text"));
        then.status(200).json_body(json!({ "value": "Submit" }));
    });
    let script_click = server.mock(|when, then| {
        when.method(POST).path(session_path("/execute/sync")).json_body(json!({
            "script": "arguments[0].click();",
            "args": [{ ELEMENT_KEY: "el-submit" }],
        }));
        then.status(200).json_body(json!({ "value": null }));
    });
    let native_click = server.mock(|when, then| {
        when.method(POST).path(session_path("/element/el-submit/click"));
        then.status(200).json_body(json!({ "value": null }));
    });

    let handle = backend.find(&Locator::id("submit")).unwrap();
    backend.act(&handle, &ActionKind::ScriptClick).unwrap();

    script_click.assert();
    assert_eq!(native_click.hits(), 0);
}

#[test]
fn test_scroll_into_view_uses_ui_scrollable() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Android);
    let locator = Locator::text_contains("System");
    server.mock(|when, then| {
        when.method(POST).path(session_path("/element")).json_body(json!({
            "using": "-android uiautomator",
            "value": locator.to_ui_automator(),
        }));
        then.status(404).json_body(no_such_element());
    });
    let scrollable = server.mock(|when, then| {
        when.method(POST).path(session_path("/element")).json_body(json!({
            "using": "-android uiautomator",
            "value": locator.to_ui_scrollable(ScrollSpec::DEFAULT_MAX_SWIPES),
        }));
        then.status(404).json_body(no_such_element());
    });

    // Neither the direct lookup nor the scroll reveals it
    let err = locate_with_scroll(&mut backend, &locator, true).unwrap_err();
    assert!(err.to_string().contains("after scroll"));
    assert_eq!(scrollable.hits(), 1);
}

#[test]
fn test_screenshot_decoded_from_base64() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Android);
    let png = b"\x89PNG\r\n\x1a\nfake";
    server.mock(|when, then| {
        when.method(GET).path(session_path("/screenshot"));
        then.status(200)
            .json_body(json!({ "value": BASE64.encode(png) }));
    });

    assert_eq!(backend.query_screenshot().unwrap(), png.to_vec());
}

#[test]
fn test_navigate_only_privileged_command_on_web() {
    let server = MockServer::start();
    let mut backend = connect(&server, Platform::Web);
    let navigate = server.mock(|when, then| {
        when.method(POST)
            .path(session_path("/url"))
            .json_body(json!({ "url": "https://demoqa.com/automation-practice-form" }));
        then.status(200).json_body(json!({ "value": null }));
    });

    backend
        .run_privileged_command(
            "navigate",
            &["https://demoqa.com/automation-practice-form".to_string()],
        )
        .unwrap();
    navigate.assert();

    let err = backend.run_privileged_command("am", &[]).unwrap_err();
    assert!(err.to_string().contains("unsupported operation"));
}

#[test]
fn test_session_release_terminates_app_and_deletes_session() {
    let server = MockServer::start();
    let cfg = config(&server, Platform::Android);
    mock_handshake(&server, &cfg);
    let terminate = server.mock(|when, then| {
        when.method(POST).path(session_path("/execute/sync")).json_body(json!({
            "script": "mobile: terminateApp",
            "args": [{ "appId": "com.android.settings" }],
        }));
        then.status(200).json_body(json!({ "value": true }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path(session_path(""));
        then.status(200).json_body(json!({ "value": null }));
    });

    let mut factory = WebDriverFactory::new(cfg);
    {
        let session = DeviceSession::open(&mut factory, Some("com.android.settings".into())).unwrap();
        assert!(!session.is_released());
    }

    terminate.assert();
    delete.assert();
}

#[test]
fn test_terminate_failure_falls_back_to_force_stop() {
    let server = MockServer::start();
    let cfg = config(&server, Platform::Android);
    mock_handshake(&server, &cfg);
    server.mock(|when, then| {
        when.method(POST).path(session_path("/execute/sync")).json_body(json!({
            "script": "mobile: terminateApp",
            "args": [{ "appId": "com.android.settings" }],
        }));
        then.status(500).json_body(json!({ "value": {
            "error": "unknown error",
            "message": "terminateApp is not supported"
        } }));
    });
    let force_stop = server.mock(|when, then| {
        when.method(POST).path(session_path("/execute/sync")).json_body(json!({
            "script": "mobile: shell",
            "args": [{ "command": "am", "args": ["force-stop", "com.android.settings"] }],
        }));
        then.status(200).json_body(json!({ "value": "" }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path(session_path(""));
        then.status(200).json_body(json!({ "value": null }));
    });

    let mut factory = WebDriverFactory::new(cfg);
    let mut session = DeviceSession::open(&mut factory, Some("com.android.settings".into())).unwrap();
    assert!(session.release());

    force_stop.assert();
    delete.assert();
}
