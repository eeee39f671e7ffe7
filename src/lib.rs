//! ui-sync - synchronization and element resolution for UI verification.
//!
//! This crate provides:
//! - A bounded polling engine with an injectable clock
//! - Locators, anchor sets, and single-query candidate resolution
//! - Scroll escalation for elements outside the viewport
//! - Screen states (page objects) with explicit load and transition steps
//! - Failure diagnostics: screenshot, tree dump, visible-text listing
//! - Backends for W3C WebDriver / Appium servers and a scripted mock device
//!
//! # Example
//!
//! ```rust,no_run
//! use ui_sync::screen::catalog;
//! use ui_sync::snapshot::{WebDriverBackend, WebDriverConfig};
//! use ui_sync::sync::{Poller, SystemClock, WaitOptions};
//!
//! let mut backend = WebDriverBackend::connect(&WebDriverConfig::from_config(ui_sync::config::get())).unwrap();
//! let clock = SystemClock::new();
//! let poller = Poller::new(WaitOptions::from_config(), &clock);
//! catalog::settings_main().wait_loaded(&mut backend, &poller).unwrap();
//! ```

pub mod config;
pub mod diagnostics;
pub mod harness;
pub mod runner;
pub mod screen;
pub mod session;
pub mod snapshot;
pub mod sync;

// Re-export runner types
pub use runner::{FlowResult, StepRecord, StepStatus};

// Re-export harness types
pub use harness::{FlowConfig, FlowStep, HarnessError, HarnessResult, RunContext, run_flow};

// Re-export the engine
pub use sync::{
    AnchorSet, Clock, Locator, ManualClock, NotFound, Poller, SyncError, SyncResult, SystemClock,
    WaitOptions, WaitOutcome, resolve_any,
};

// Re-export screens and diagnostics
pub use diagnostics::{ArtifactSink, DiagnosticsBundle, FsArtifactSink, OutputEncoding};
pub use screen::{ScreenError, ScreenResult, ScreenState};

// Re-export backends and session management
pub use session::{DeviceSession, MockFactory, SessionFactory, WebDriverFactory};
pub use snapshot::{
    BackendError, BackendResult, MockDevice, NodeHandle, UiBackend, UiNode, UiTree,
    WebDriverBackend, WebDriverConfig,
};
