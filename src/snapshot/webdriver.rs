//! W3C WebDriver / Appium client backend.
//!
//! Talks to an Appium server (Android, UiAutomator2 driver) or a browser
//! driver over plain HTTP+JSON using `reqwest::blocking`. One request is in
//! flight at a time; the engine is synchronous.
//!
//! Protocol errors of kind `no such element` are the only negative lookup
//! signal. Every other failure is a [`BackendError`] and is never retried.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{ActionKind, ScrollSpec, UiBackend};
use super::types::{BackendError, BackendResult, NodeHandle, UiNode, UiTree};
use super::xml::tree_from_xml;
use crate::config::{Config, Platform};
use crate::sync::locator::Locator;
use crate::sync::types::{LookupError, NotFound};

/// W3C web element reference key
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver Enter key
pub const COMMIT_KEY: &str = "\u{E007}";

const NO_SUCH_ELEMENT: &str = "no such element";

/// Turns the DOM into the `UiNode` JSON shape
const DOM_EXTRACT_SCRIPT: &str = r#"
const skip = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE']);
const walk = (el) => {
  const own = Array.from(el.childNodes)
    .filter((n) => n.nodeType === Node.TEXT_NODE)
    .map((n) => n.textContent)
    .join(' ')
    .trim();
  const r = el.getBoundingClientRect();
  return {
    class: el.tagName.toLowerCase(),
    text: own || (typeof el.value === 'string' ? el.value : ''),
    content_desc: el.getAttribute('aria-label') || el.getAttribute('placeholder') || '',
    resource_id: el.id || '',
    bounds: { left: Math.round(r.left), top: Math.round(r.top), right: Math.round(r.right), bottom: Math.round(r.bottom) },
    scrollable: el.scrollHeight > el.clientHeight && getComputedStyle(el).overflowY !== 'visible',
    children: Array.from(el.children).filter((c) => !skip.has(c.tagName)).map(walk),
  };
};
return document.body ? [walk(document.body)] : [];
"#;

/// Connection and capability settings for a new session
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    pub server_url: String,
    pub platform: Platform,
    pub device_name: String,
    pub udid: String,
    pub new_command_timeout: u64,
    pub http_timeout: Duration,
}

impl WebDriverConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            server_url: cfg.server.url.clone(),
            platform: cfg.server.platform,
            device_name: cfg.device.device_name.clone(),
            udid: cfg.device.udid.clone(),
            new_command_timeout: cfg.device.new_command_timeout,
            http_timeout: Duration::from_secs(cfg.server.http_timeout),
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// `alwaysMatch` capabilities for the new-session request
    pub fn capabilities(&self) -> Value {
        match self.platform {
            Platform::Android => json!({
                "platformName": "Android",
                "appium:automationName": "UiAutomator2",
                "appium:deviceName": self.device_name,
                "appium:udid": self.udid,
                "appium:noReset": true,
                "appium:newCommandTimeout": self.new_command_timeout,
            }),
            Platform::Web => json!({
                "browserName": "chrome",
                "goog:chromeOptions": { "args": ["--start-maximized"] },
            }),
        }
    }
}

/// A live WebDriver session
pub struct WebDriverBackend {
    client: Client,
    base_url: String,
    session_id: Option<String>,
    platform: Platform,
}

impl WebDriverBackend {
    /// Create a session and disable implicit waits (all waiting is explicit)
    pub fn connect(config: &WebDriverConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| BackendError::Transport {
                command: "new session".to_string(),
                message: e.to_string(),
            })?;

        let mut backend = Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            session_id: None,
            platform: config.platform,
        };

        let body = json!({ "capabilities": { "alwaysMatch": config.capabilities() } });
        let value = backend.send(Method::POST, "/session", Some(body), "new session")?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::decode("new session", "response has no sessionId"))?
            .to_string();
        info!(session = %session_id, platform = %config.platform, "session created");
        backend.session_id = Some(session_id);

        let path = backend.session_path("/timeouts")?;
        backend.send(Method::POST, &path, Some(json!({ "implicit": 0 })), "set timeouts")?;
        Ok(backend)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Load a URL in the browser session
    pub fn navigate(&mut self, url: &str) -> BackendResult<()> {
        let path = self.session_path("/url")?;
        self.send(Method::POST, &path, Some(json!({ "url": url })), "navigate")?;
        Ok(())
    }

    fn session_path(&self, suffix: &str) -> BackendResult<String> {
        let id = self.session_id.as_deref().ok_or(BackendError::NoSession)?;
        Ok(format!("/session/{}{}", id, suffix))
    }

    /// Send one request and unwrap the `value` member of the response
    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        command: &str,
    ) -> BackendResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(command, %method, %url, "webdriver request");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().map_err(|e| BackendError::Transport {
            command: command.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .map_err(|e| BackendError::decode(command, format!("HTTP {}: {}", status, e)))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(BackendError::Protocol {
                command: command.to_string(),
                error: value
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(value)
    }

    fn execute(&self, script: &str, args: Value, command: &str) -> BackendResult<Value> {
        let path = self.session_path("/execute/sync")?;
        self.send(
            Method::POST,
            &path,
            Some(json!({ "script": script, "args": args })),
            command,
        )
    }

    /// Native selector strategy and expression for this platform
    fn selector(&self, locator: &Locator) -> (&'static str, String) {
        match self.platform {
            Platform::Android => ("-android uiautomator", locator.to_ui_automator()),
            Platform::Web => ("xpath", locator.to_xpath()),
        }
    }

    fn find_element(&self, using: &str, value: &str, label: &str) -> Result<String, LookupError> {
        let path = self.session_path("/element")?;
        let body = json!({ "using": using, "value": value });
        match self.send(Method::POST, &path, Some(body), "find element") {
            Ok(found) => Ok(element_id(&found)?),
            Err(BackendError::Protocol { error, message, .. }) if error == NO_SUCH_ELEMENT => {
                Err(NotFound::new(label, message).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn element_text(&self, element: &str) -> BackendResult<String> {
        let path = self.session_path(&format!("/element/{}/text", element))?;
        let value = self.send(Method::GET, &path, None, "element text")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Element id for a handle; tree-located handles are re-found natively
    fn live_element(&self, node: &NodeHandle) -> BackendResult<String> {
        if !node.is_tree_located() {
            return Ok(node.id.clone());
        }
        let (using, value) = self.selector(&node.locator);
        match self.find_element(using, &value, &node.locator.to_string()) {
            Ok(id) => Ok(id),
            Err(LookupError::NotFound(e)) => Err(BackendError::Protocol {
                command: "act".to_string(),
                error: NO_SUCH_ELEMENT.to_string(),
                message: e.to_string(),
            }),
            Err(LookupError::Backend(e)) => Err(e),
        }
    }

    fn send_keys(&self, element: &str, text: &str) -> BackendResult<()> {
        let path = self.session_path(&format!("/element/{}/value", element))?;
        let chars: Vec<String> = text.chars().map(String::from).collect();
        self.send(
            Method::POST,
            &path,
            Some(json!({ "text": text, "value": chars })),
            "send keys",
        )?;
        Ok(())
    }
}

impl UiBackend for WebDriverBackend {
    fn source_type(&self) -> &str {
        match self.platform {
            Platform::Android => "android",
            Platform::Web => "web",
        }
    }

    fn query_tree(&mut self) -> BackendResult<UiTree> {
        match self.platform {
            Platform::Android => {
                let path = self.session_path("/source")?;
                let value = self.send(Method::GET, &path, None, "page source")?;
                let xml = value
                    .as_str()
                    .ok_or_else(|| BackendError::decode("page source", "source is not a string"))?;
                tree_from_xml(xml)
            }
            Platform::Web => {
                let value = self.execute(DOM_EXTRACT_SCRIPT, json!([]), "dom extract")?;
                let roots: Vec<UiNode> = serde_json::from_value(value)?;
                Ok(UiTree::new(roots))
            }
        }
    }

    fn query_screenshot(&mut self) -> BackendResult<Vec<u8>> {
        let path = self.session_path("/screenshot")?;
        let value = self.send(Method::GET, &path, None, "screenshot")?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BackendError::decode("screenshot", "screenshot is not a string"))?;
        BASE64
            .decode(encoded.trim())
            .map_err(|e| BackendError::decode("screenshot", e.to_string()))
    }

    fn find(&mut self, locator: &Locator) -> Result<NodeHandle, LookupError> {
        let (using, value) = self.selector(locator);
        let element = self.find_element(using, &value, &locator.to_string())?;
        let text = self.element_text(&element)?;
        Ok(NodeHandle::new(
            element,
            locator.clone(),
            UiNode::new("").with_text(text),
        ))
    }

    fn act(&mut self, node: &NodeHandle, action: &ActionKind) -> BackendResult<()> {
        let element = self.live_element(node)?;
        debug!(element = %element, ?action, "act");
        match action {
            ActionKind::ScriptClick if self.platform == Platform::Web => {
                self.execute(
                    "arguments[0].click();",
                    json!([{ ELEMENT_KEY: element }]),
                    "script click",
                )?;
                Ok(())
            }
            ActionKind::Click | ActionKind::ScriptClick => {
                let path = self.session_path(&format!("/element/{}/click", element))?;
                self.send(Method::POST, &path, Some(json!({})), "click")?;
                Ok(())
            }
            ActionKind::Type(text) => self.send_keys(&element, text),
            ActionKind::CommitKey => self.send_keys(&element, COMMIT_KEY),
        }
    }

    fn gesture(&mut self, spec: &ScrollSpec) -> BackendResult<()> {
        let target = &spec.target;
        let label = target.to_string();
        let found = match self.platform {
            // UiScrollable performs the swipes itself while resolving the selector
            Platform::Android => self.find_element(
                "-android uiautomator",
                &target.to_ui_scrollable(spec.max_swipes),
                &label,
            ),
            Platform::Web => self
                .find_element("xpath", &target.to_xpath(), &label)
                .and_then(|element| {
                    self.execute(
                        "arguments[0].scrollIntoView({block: 'center'});",
                        json!([{ ELEMENT_KEY: element }]),
                        "scroll into view",
                    )
                    .map(|_| element)
                    .map_err(LookupError::from)
                }),
        };

        match found {
            Ok(_) => Ok(()),
            // The follow-up lookup reports absence
            Err(LookupError::NotFound(e)) => {
                debug!(target = %label, reason = %e.reason, "scroll did not reveal target");
                Ok(())
            }
            Err(LookupError::Backend(e)) => Err(e),
        }
    }

    fn run_privileged_command(&mut self, name: &str, args: &[String]) -> BackendResult<Value> {
        match self.platform {
            Platform::Android => self.execute(
                "mobile: shell",
                json!([{ "command": name, "args": args }]),
                "mobile: shell",
            ),
            Platform::Web if name == "navigate" => {
                let url = args
                    .first()
                    .ok_or_else(|| BackendError::decode("navigate", "missing url argument"))?;
                self.navigate(url)?;
                Ok(Value::Null)
            }
            Platform::Web => Err(BackendError::Protocol {
                command: name.to_string(),
                error: "unsupported operation".to_string(),
                message: "browser sessions only accept \"navigate\"".to_string(),
            }),
        }
    }

    fn terminate_app(&mut self, package: &str) -> BackendResult<()> {
        if self.platform == Platform::Web {
            return Ok(());
        }
        self.execute(
            "mobile: terminateApp",
            json!([{ "appId": package }]),
            "mobile: terminateApp",
        )?;
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        let Some(id) = self.session_id.take() else {
            return Ok(());
        };
        self.send(Method::DELETE, &format!("/session/{}", id), None, "delete session")?;
        info!(session = %id, "session deleted");
        Ok(())
    }
}

fn element_id(value: &Value) -> BackendResult<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::decode("find element", "response has no element reference"))
}
