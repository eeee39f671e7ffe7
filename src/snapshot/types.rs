// Define core types for UI snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sync::locator::Locator;

/// On-screen geometry of a node, in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Parse the UiAutomator `[l,t][r,b]` notation
    pub fn parse(raw: &str) -> Option<Self> {
        let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
        let (first, second) = inner.split_once("][")?;
        let (left, top) = first.split_once(',')?;
        let (right, bottom) = second.split_once(',')?;
        Some(Self {
            left: left.trim().parse().ok()?,
            top: top.trim().parse().ok()?,
            right: right.trim().parse().ok()?,
            bottom: bottom.trim().parse().ok()?,
        })
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}][{},{}]", self.left, self.top, self.right, self.bottom)
    }
}

/// One element of the UI hierarchy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiNode {
    /// Widget class or DOM tag (e.g. "android.widget.TextView", "label")
    pub class: String,

    /// Visible text
    #[serde(default)]
    pub text: String,

    /// Accessibility description
    #[serde(default)]
    pub content_desc: String,

    /// Structural identifier (Android resource-id, DOM id)
    #[serde(default)]
    pub resource_id: String,

    #[serde(default)]
    pub bounds: Option<Bounds>,

    /// Whether the node is a scroll container
    #[serde(default)]
    pub scrollable: bool,

    #[serde(default)]
    pub children: Vec<UiNode>,
}

impl UiNode {
    /// Create a node of the given class
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Default::default()
        }
    }

    /// Android-style text view carrying the given label
    pub fn text_view(text: impl Into<String>) -> Self {
        Self::new("android.widget.TextView").with_text(text)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.content_desc = desc.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = id.into();
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn scrollable(mut self, scrollable: bool) -> Self {
        self.scrollable = scrollable;
        self
    }

    pub fn child(mut self, node: UiNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn children(mut self, nodes: impl IntoIterator<Item = UiNode>) -> Self {
        self.children.extend(nodes);
        self
    }

    /// Trimmed visible text, if any
    pub fn visible_text(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Node attributes without the subtree
    pub fn detached(&self) -> UiNode {
        UiNode {
            children: Vec::new(),
            ..self.clone()
        }
    }
}

/// Hierarchical node list captured from the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiTree {
    pub roots: Vec<UiNode>,
}

impl UiTree {
    pub fn new(roots: Vec<UiNode>) -> Self {
        Self { roots }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Depth-first (document order) traversal yielding `(path, node)` pairs.
    ///
    /// The path is the child-index chain from the root, e.g. `"0/2/1"`.
    pub fn walk(&self) -> Vec<(String, &UiNode)> {
        let mut out = Vec::new();
        let mut stack: Vec<(String, &UiNode)> = self
            .roots
            .iter()
            .enumerate()
            .rev()
            .map(|(i, n)| (i.to_string(), n))
            .collect();

        while let Some((path, node)) = stack.pop() {
            for (i, child) in node.children.iter().enumerate().rev() {
                stack.push((format!("{}/{}", path, i), child));
            }
            out.push((path, node));
        }
        out
    }

    /// Number of nodes in the tree
    pub fn len(&self) -> usize {
        self.walk().len()
    }

    /// Trimmed, non-empty texts in tree order
    pub fn visible_texts(&self) -> Vec<String> {
        self.walk()
            .into_iter()
            .filter_map(|(_, node)| node.visible_text().map(str::to_string))
            .collect()
    }
}

/// Immutable point-in-time capture of the remote UI
#[derive(Debug, Clone)]
pub struct UiSnapshot {
    pub tree: UiTree,

    /// Encoded screenshot (PNG for every shipped backend)
    pub screenshot: Vec<u8>,

    pub taken_at: DateTime<Utc>,
}

impl UiSnapshot {
    pub fn new(tree: UiTree, screenshot: Vec<u8>) -> Self {
        Self {
            tree,
            screenshot,
            taken_at: Utc::now(),
        }
    }
}

/// Where a handle's `id` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOrigin {
    /// Element reference issued by the backend
    Element,
    /// Child-index path ("0/3/1") into a queried tree; must be re-found
    /// before acting on it
    TreePath,
}

/// A resolved, live element
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHandle {
    /// Backend element id, or a tree path when `origin` is [`HandleOrigin::TreePath`]
    pub id: String,

    pub origin: HandleOrigin,

    /// Locator that produced this handle
    pub locator: Locator,

    /// Node attributes at resolution time
    pub node: UiNode,
}

impl NodeHandle {
    pub fn new(id: impl Into<String>, locator: Locator, node: UiNode) -> Self {
        Self {
            id: id.into(),
            origin: HandleOrigin::Element,
            locator,
            node,
        }
    }

    pub fn from_tree(path: impl Into<String>, locator: Locator, node: UiNode) -> Self {
        Self {
            origin: HandleOrigin::TreePath,
            ..Self::new(path, locator, node)
        }
    }

    pub fn is_tree_located(&self) -> bool {
        self.origin == HandleOrigin::TreePath
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Failures of the remote backend itself (never "target absent")
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection / HTTP level failure
    #[error("transport error during {command}: {message}")]
    Transport { command: String, message: String },

    /// Backend answered with a protocol-level error
    #[error("{command} failed: {error}: {message}")]
    Protocol {
        command: String,
        error: String,
        message: String,
    },

    /// Backend answered with something we could not decode
    #[error("unexpected response to {command}: {message}")]
    Decode { command: String, message: String },

    /// No session is open
    #[error("no active session")]
    NoSession,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl BackendError {
    pub fn decode(command: &str, message: impl Into<String>) -> Self {
        BackendError::Decode {
            command: command.to_string(),
            message: message.into(),
        }
    }
}
