//! Backend session ownership.
//!
//! Every flow acquires a fresh backend through a [`SessionFactory`] and holds
//! it in a [`DeviceSession`] guard. The guard releases the backend exactly
//! once on every exit path: explicit release, early return, error, or panic
//! unwinding through `Drop`.

use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

use crate::snapshot::backend::{MockDevice, UiBackend};
use crate::snapshot::types::{BackendError, BackendResult};
use crate::snapshot::utils::generate_timestamp;
use crate::snapshot::webdriver::{WebDriverBackend, WebDriverConfig};

static SESSION_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Produces fresh backend sessions
pub trait SessionFactory {
    type Backend: UiBackend;

    fn acquire(&mut self) -> BackendResult<Self::Backend>;
}

/// Opens a new WebDriver / Appium session per acquire
#[derive(Debug, Clone)]
pub struct WebDriverFactory {
    pub config: WebDriverConfig,
}

impl WebDriverFactory {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for WebDriverFactory {
    type Backend = WebDriverBackend;

    fn acquire(&mut self) -> BackendResult<WebDriverBackend> {
        WebDriverBackend::connect(&self.config)
    }
}

/// Builds scripted devices, counting acquisitions
pub struct MockFactory<F: FnMut() -> MockDevice> {
    build: F,
    acquired: usize,
}

impl<F: FnMut() -> MockDevice> MockFactory<F> {
    pub fn new(build: F) -> Self {
        Self { build, acquired: 0 }
    }

    pub fn acquired(&self) -> usize {
        self.acquired
    }
}

impl<F: FnMut() -> MockDevice> SessionFactory for MockFactory<F> {
    type Backend = MockDevice;

    fn acquire(&mut self) -> BackendResult<MockDevice> {
        self.acquired += 1;
        Ok((self.build)())
    }
}

/// Scoped owner of one backend session
pub struct DeviceSession<B: UiBackend> {
    id: String,
    backend: Option<B>,
    /// Terminated before the session is closed
    app_package: Option<String>,
}

impl<B: UiBackend> DeviceSession<B> {
    /// Acquire a backend from `factory`
    pub fn open<F>(factory: &mut F, app_package: Option<String>) -> BackendResult<Self>
    where
        F: SessionFactory<Backend = B>,
    {
        let backend = factory.acquire()?;
        let id = generate_session_id();
        info!(session = %id, backend = backend.source_type(), "session acquired");
        Ok(Self {
            id,
            backend: Some(backend),
            app_package,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_released(&self) -> bool {
        self.backend.is_none()
    }

    /// The live backend; `NoSession` after release
    pub fn backend_mut(&mut self) -> BackendResult<&mut B> {
        self.backend.as_mut().ok_or(BackendError::NoSession)
    }

    /// Stop the app under test and close the session.
    ///
    /// Teardown errors are logged, never raised. Returns `false` if the
    /// session was already released.
    pub fn release(&mut self) -> bool {
        let Some(mut backend) = self.backend.take() else {
            return false;
        };

        if let Some(package) = &self.app_package {
            if let Err(e) = backend.terminate_app(package) {
                warn!(session = %self.id, package, error = %e, "terminate failed, trying force-stop");
                let args = ["force-stop".to_string(), package.clone()];
                if let Err(e) = backend.run_privileged_command("am", &args) {
                    warn!(session = %self.id, package, error = %e, "force-stop failed");
                }
            }
        }

        if let Err(e) = backend.close() {
            warn!(session = %self.id, error = %e, "failed to close session");
        }
        info!(session = %self.id, "session released");
        true
    }
}

impl<B: UiBackend> Drop for DeviceSession<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let n = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("session_{}_{}_{}", generate_timestamp(), std::process::id(), n)
}
