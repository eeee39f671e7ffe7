//! Remote backend abstraction.
//!
//! [`UiBackend`] is the only contract the engine needs from a browser or
//! device driver:
//! - `query_tree` / `query_screenshot` for snapshots
//! - `find` for native single-element lookup
//! - `act` and `gesture`, the only calls that change UI state
//! - `run_privileged_command` to launch the target from outside the UI
//!
//! [`MockDevice`] is a scripted in-memory implementation used by tests and by
//! the `--mock` CLI mode.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageBuffer, RgbImage};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;

use super::types::{BackendError, BackendResult, NodeHandle, UiSnapshot, UiTree};
use crate::sync::locator::Locator;
use crate::sync::types::LookupError;

/// Element interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    /// Click dispatched by page script; a native click where there is none
    ScriptClick,
    /// Send literal keystrokes
    Type(String),
    /// Send the commit (Enter/Return) key
    CommitKey,
}

/// Scroll the first scrollable container until `target` is revealed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollSpec {
    pub target: Locator,
    /// Upper bound on swipes the backend may issue while searching
    pub max_swipes: u32,
}

impl ScrollSpec {
    /// Default swipe budget for scroll-into-view searches
    pub const DEFAULT_MAX_SWIPES: u32 = 10;

    pub fn into_view(target: Locator) -> Self {
        Self {
            target,
            max_swipes: Self::DEFAULT_MAX_SWIPES,
        }
    }
}

/// Capability interface of a remote browser or device driver
pub trait UiBackend {
    /// Backend identifier (e.g. "android", "web", "mock")
    fn source_type(&self) -> &str;

    /// Current UI hierarchy
    fn query_tree(&mut self) -> BackendResult<UiTree>;

    /// Current rendered screen as encoded image bytes
    fn query_screenshot(&mut self) -> BackendResult<Vec<u8>>;

    /// Fresh tree plus screenshot
    fn snapshot(&mut self) -> BackendResult<UiSnapshot> {
        let tree = self.query_tree()?;
        let screenshot = self.query_screenshot()?;
        Ok(UiSnapshot::new(tree, screenshot))
    }

    /// Single lookup attempt; `NotFound` when the target is absent
    fn find(&mut self, locator: &Locator) -> Result<NodeHandle, LookupError> {
        find_via_tree(self, locator)
    }

    fn act(&mut self, node: &NodeHandle, action: &ActionKind) -> BackendResult<()>;

    fn gesture(&mut self, spec: &ScrollSpec) -> BackendResult<()>;

    /// Out-of-UI command used to launch the target app or page
    fn run_privileged_command(
        &mut self,
        name: &str,
        args: &[String],
    ) -> BackendResult<serde_json::Value>;

    /// Stop the application under test
    fn terminate_app(&mut self, package: &str) -> BackendResult<()> {
        self.run_privileged_command("am", &["force-stop".to_string(), package.to_string()])
            .map(|_| ())
    }

    /// Release the remote session
    fn close(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

/// Query the tree and evaluate `locator` against it
pub fn find_via_tree<B: UiBackend + ?Sized>(
    backend: &mut B,
    locator: &Locator,
) -> Result<NodeHandle, LookupError> {
    let tree = backend.query_tree()?;
    Ok(locator.find_in(&tree)?)
}

impl UiBackend for Box<dyn UiBackend> {
    fn source_type(&self) -> &str {
        (**self).source_type()
    }

    fn query_tree(&mut self) -> BackendResult<UiTree> {
        (**self).query_tree()
    }

    fn query_screenshot(&mut self) -> BackendResult<Vec<u8>> {
        (**self).query_screenshot()
    }

    fn snapshot(&mut self) -> BackendResult<UiSnapshot> {
        (**self).snapshot()
    }

    fn find(&mut self, locator: &Locator) -> Result<NodeHandle, LookupError> {
        (**self).find(locator)
    }

    fn act(&mut self, node: &NodeHandle, action: &ActionKind) -> BackendResult<()> {
        (**self).act(node, action)
    }

    fn gesture(&mut self, spec: &ScrollSpec) -> BackendResult<()> {
        (**self).gesture(spec)
    }

    fn run_privileged_command(
        &mut self,
        name: &str,
        args: &[String],
    ) -> BackendResult<serde_json::Value> {
        (**self).run_privileged_command(name, args)
    }

    fn terminate_app(&mut self, package: &str) -> BackendResult<()> {
        (**self).terminate_app(package)
    }

    fn close(&mut self) -> BackendResult<()> {
        (**self).close()
    }
}

/// A virtual framebuffer used to render mock screenshots
///
/// Provides a small drawing API:
/// - `fill()` - Fill entire buffer with a color
/// - `draw_rect()` - Draw a filled rectangle
/// - `draw_text()` - Draw text using font8x8 glyphs
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    /// RGB pixel buffer (row-major, 3 bytes per pixel)
    buffer: Vec<u8>,
}

impl Framebuffer {
    /// Create a new framebuffer with the given dimensions, initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        let buffer = vec![0u8; (width * height * 3) as usize];
        Self {
            width,
            height,
            buffer,
        }
    }

    /// Create a framebuffer initialized to a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut fb = Self::new(width, height);
        fb.fill(color);
        fb
    }

    /// Render the visible texts of a tree, one line per node
    pub fn render_tree(tree: &UiTree, width: u32, height: u32) -> Self {
        let mut fb = Self::with_color(width, height, [250, 250, 250]);
        fb.draw_rect(0, 0, width, 14, [26, 115, 232]);
        for (line, text) in tree.visible_texts().iter().enumerate() {
            let y = 20 + line as u32 * 12;
            if y + 8 > height {
                break;
            }
            fb.draw_text(6, y, text, [32, 33, 36], [250, 250, 250]);
        }
        fb
    }

    /// Fill the entire framebuffer with a color
    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Draw a filled rectangle
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..(y + h).min(self.height) {
            for px in x..(x + w).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text using 8x8 glyphs. Text does not wrap; unknown glyphs render blank.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width {
                break;
            }
            let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
            for (row_idx, row) in glyph.iter().enumerate() {
                for bit in 0..8 {
                    // font8x8 stores LSB as leftmost pixel
                    let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                    self.set_pixel(cursor_x + bit, y + row_idx as u32, color);
                }
            }
            cursor_x += 8;
        }
    }

    #[cfg(test)]
    fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * self.width + x) * 3) as usize;
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }

    fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.buffer[idx..idx + 3].copy_from_slice(&color);
    }

    /// Encode the framebuffer as PNG bytes
    pub fn to_png(&self) -> BackendResult<Vec<u8>> {
        let img: RgbImage = ImageBuffer::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| BackendError::decode("screenshot", "framebuffer size mismatch"))?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Everything a [`MockDevice`] was asked to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    QueryTree,
    Screenshot,
    Find(Locator),
    Act {
        id: String,
        text: String,
        action: ActionKind,
    },
    Gesture(ScrollSpec),
    Command {
        name: String,
        args: Vec<String>,
    },
    Closed,
}

/// Shared handle to a mock device's event log.
///
/// Clone it before handing the device to a session so the log stays
/// readable after the device is gone.
pub type EventLog = Rc<RefCell<Vec<MockEvent>>>;

/// Scripted in-memory backend.
///
/// The n-th tree query returns `frames[n]` (the last frame repeats). A scroll
/// gesture swaps in the `scroll_reveal` tree, and clicking a node whose text
/// contains a registered label switches to that label's frames.
#[derive(Debug)]
pub struct MockDevice {
    frames: Vec<UiTree>,
    cursor: usize,
    total_queries: usize,
    revealed: Option<UiTree>,
    scroll_reveal: Option<UiTree>,
    navigation: Vec<(String, Vec<UiTree>)>,
    fault_at: Option<usize>,
    screenshot_fault: bool,
    width: u32,
    height: u32,
    events: EventLog,
}

impl MockDevice {
    /// Default mock screen size (pixels)
    pub const DEFAULT_WIDTH: u32 = 360;
    pub const DEFAULT_HEIGHT: u32 = 640;

    pub fn new(frames: Vec<UiTree>) -> Self {
        Self {
            frames,
            cursor: 0,
            total_queries: 0,
            revealed: None,
            scroll_reveal: None,
            navigation: Vec::new(),
            fault_at: None,
            screenshot_fault: false,
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Tree shown after any scroll gesture
    pub fn with_scroll_reveal(mut self, tree: UiTree) -> Self {
        self.scroll_reveal = Some(tree);
        self
    }

    /// Clicking a node whose text contains `label` moves to `frames`
    pub fn on_click(mut self, label: impl Into<String>, frames: Vec<UiTree>) -> Self {
        self.navigation.push((label.into(), frames));
        self
    }

    /// Fail the tree query with this zero-based index with a transport error
    pub fn with_fault_at(mut self, query_index: usize) -> Self {
        self.fault_at = Some(query_index);
        self
    }

    /// Make every screenshot request fail
    pub fn with_screenshot_fault(mut self) -> Self {
        self.screenshot_fault = true;
        self
    }

    pub fn event_log(&self) -> EventLog {
        Rc::clone(&self.events)
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.events.borrow().clone()
    }

    /// Tree queries served so far
    pub fn queries(&self) -> usize {
        self.total_queries
    }

    pub fn gesture_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, MockEvent::Gesture(_)))
            .count()
    }

    fn record(&self, event: MockEvent) {
        self.events.borrow_mut().push(event);
    }

    fn current_tree(&self) -> UiTree {
        if let Some(tree) = &self.revealed {
            return tree.clone();
        }
        match self.frames.len() {
            0 => UiTree::empty(),
            n => self.frames[self.cursor.min(n - 1)].clone(),
        }
    }
}

impl UiBackend for MockDevice {
    fn source_type(&self) -> &str {
        "mock"
    }

    fn query_tree(&mut self) -> BackendResult<UiTree> {
        self.record(MockEvent::QueryTree);
        let index = self.total_queries;
        self.total_queries += 1;
        if self.fault_at == Some(index) {
            return Err(BackendError::Transport {
                command: "query_tree".to_string(),
                message: "connection reset by peer".to_string(),
            });
        }
        let tree = self.current_tree();
        self.cursor += 1;
        Ok(tree)
    }

    fn query_screenshot(&mut self) -> BackendResult<Vec<u8>> {
        self.record(MockEvent::Screenshot);
        if self.screenshot_fault {
            return Err(BackendError::Transport {
                command: "screenshot".to_string(),
                message: "device offline".to_string(),
            });
        }
        Framebuffer::render_tree(&self.current_tree(), self.width, self.height).to_png()
    }

    fn find(&mut self, locator: &Locator) -> Result<NodeHandle, LookupError> {
        self.record(MockEvent::Find(locator.clone()));
        find_via_tree(self, locator)
    }

    fn act(&mut self, node: &NodeHandle, action: &ActionKind) -> BackendResult<()> {
        self.record(MockEvent::Act {
            id: node.id.clone(),
            text: node.node.text.clone(),
            action: action.clone(),
        });

        if matches!(action, ActionKind::Click | ActionKind::ScriptClick) {
            let target = self
                .navigation
                .iter()
                .find(|(label, _)| node.node.text.contains(label.as_str()))
                .map(|(_, frames)| frames.clone());
            if let Some(frames) = target {
                self.frames = frames;
                self.cursor = 0;
                self.revealed = None;
            }
        }
        Ok(())
    }

    fn gesture(&mut self, spec: &ScrollSpec) -> BackendResult<()> {
        self.record(MockEvent::Gesture(spec.clone()));
        if let Some(tree) = &self.scroll_reveal {
            self.revealed = Some(tree.clone());
        }
        Ok(())
    }

    fn run_privileged_command(
        &mut self,
        name: &str,
        args: &[String],
    ) -> BackendResult<serde_json::Value> {
        self.record(MockEvent::Command {
            name: name.to_string(),
            args: args.to_vec(),
        });
        Ok(serde_json::Value::Null)
    }

    fn close(&mut self) -> BackendResult<()> {
        self.record(MockEvent::Closed);
        Ok(())
    }
}
