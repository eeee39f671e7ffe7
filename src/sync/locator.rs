//! Typed locators and anchor sets.
//!
//! A [`Locator`] is a pure predicate over a [`UiTree`]: it never touches the
//! backend. Matching is textual/structural only, never geometric, because a
//! target's position changes between renders while its label and id do not.
//!
//! Besides evaluating against a captured tree, a locator renders itself into
//! the two native selector dialects the remote backends understand
//! (UiAutomator for Android, XPath for browsers).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::snapshot::types::{NodeHandle, UiNode, UiTree};
use crate::sync::types::NotFound;

/// Matching strategy, from most to least specific
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Strategy {
    /// Structural identifier equals `id`
    Id { id: String },
    /// Identifier equals `id` and visible text equals `text`.
    /// Disambiguates list items that share one id.
    IdText { id: String, text: String },
    /// Visible text equals `text` (after trimming)
    Text { text: String },
    /// Visible text contains `text`. Least stable; first node in tree order wins.
    TextContains { text: String },
    /// Accessibility description contains `text`
    DescContains { text: String },
}

impl Strategy {
    /// Higher is more specific
    pub fn specificity(&self) -> u8 {
        match self {
            Strategy::Id { .. } => 4,
            Strategy::IdText { .. } => 3,
            Strategy::Text { .. } => 2,
            Strategy::TextContains { .. } => 1,
            Strategy::DescContains { .. } => 0,
        }
    }
}

/// A stateless query that resolves to zero-or-one node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    #[serde(flatten)]
    pub strategy: Strategy,
}

impl Locator {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::new(Strategy::Id { id: id.into() })
    }

    pub fn id_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Strategy::IdText {
            id: id.into(),
            text: text.into(),
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Strategy::Text { text: text.into() })
    }

    pub fn text_contains(text: impl Into<String>) -> Self {
        Self::new(Strategy::TextContains { text: text.into() })
    }

    pub fn desc_contains(text: impl Into<String>) -> Self {
        Self::new(Strategy::DescContains { text: text.into() })
    }

    /// Does this single node satisfy the locator?
    pub fn matches(&self, node: &UiNode) -> bool {
        match &self.strategy {
            Strategy::Id { id } => node.resource_id == *id,
            Strategy::IdText { id, text } => node.resource_id == *id && node.text.trim() == text,
            Strategy::Text { text } => node.text.trim() == text,
            Strategy::TextContains { text } => node.text.contains(text.as_str()),
            Strategy::DescContains { text } => node.content_desc.contains(text.as_str()),
        }
    }

    /// First matching node in document order
    pub fn locate(&self, tree: &UiTree) -> Option<NodeHandle> {
        tree.walk()
            .into_iter()
            .find(|(_, node)| self.matches(node))
            .map(|(path, node)| NodeHandle::from_tree(path, self.clone(), node.detached()))
    }

    /// Like [`Locator::locate`] but reports a typed [`NotFound`]
    pub fn find_in(&self, tree: &UiTree) -> Result<NodeHandle, NotFound> {
        self.locate(tree).ok_or_else(|| {
            NotFound::new(
                self.to_string(),
                format!("absent from tree of {} nodes", tree.len()),
            )
        })
    }

    /// Render as a UiAutomator `UiSelector` expression
    pub fn to_ui_automator(&self) -> String {
        match &self.strategy {
            Strategy::Id { id } => format!("new UiSelector().resourceId({})", java_literal(id)),
            Strategy::IdText { id, text } => format!(
                "new UiSelector().resourceId({}).text({})",
                java_literal(id),
                java_literal(text)
            ),
            Strategy::Text { text } => format!("new UiSelector().text({})", java_literal(text)),
            Strategy::TextContains { text } => {
                format!("new UiSelector().textContains({})", java_literal(text))
            }
            Strategy::DescContains { text } => {
                format!("new UiSelector().descriptionContains({})", java_literal(text))
            }
        }
    }

    /// Wrap the selector in a `UiScrollable` that scrolls it into view
    pub fn to_ui_scrollable(&self, max_swipes: u32) -> String {
        format!(
            "new UiScrollable(new UiSelector().scrollable(true)).setMaxSearchSwipes({}).scrollIntoView({})",
            max_swipes,
            self.to_ui_automator()
        )
    }

    /// Render as an XPath expression over a DOM
    pub fn to_xpath(&self) -> String {
        match &self.strategy {
            Strategy::Id { id } => format!("//*[@id={}]", xpath_literal(id)),
            Strategy::IdText { id, text } => format!(
                "//*[@id={} and normalize-space(.)={}]",
                xpath_literal(id),
                xpath_literal(text)
            ),
            Strategy::Text { text } => {
                format!("//*[normalize-space(text())={}]", xpath_literal(text))
            }
            Strategy::TextContains { text } => {
                format!("//*[contains(text(),{})]", xpath_literal(text))
            }
            Strategy::DescContains { text } => {
                format!("//*[contains(@aria-label,{})]", xpath_literal(text))
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.strategy {
            Strategy::Id { id } => write!(f, "id({:?})", id),
            Strategy::IdText { id, text } => write!(f, "id({:?})+text({:?})", id, text),
            Strategy::Text { text } => write!(f, "text({:?})", text),
            Strategy::TextContains { text } => write!(f, "textContains({:?})", text),
            Strategy::DescContains { text } => write!(f, "descContains({:?})", text),
        }
    }
}

/// Ordered set of equivalent locators.
///
/// For a "loaded" check any member suffices; for an action target the order
/// is the trial priority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorSet {
    pub candidates: Vec<Locator>,
}

impl AnchorSet {
    pub fn new(candidates: Vec<Locator>) -> Self {
        Self { candidates }
    }

    /// One `TextContains` candidate per label
    pub fn text_contains<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(labels.into_iter().map(Locator::text_contains).collect())
    }

    pub fn single(locator: Locator) -> Self {
        Self::new(vec![locator])
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Locator> {
        self.candidates.iter()
    }

    /// Evaluate candidates in order against one tree.
    ///
    /// Returns the first hit, or the `NotFound` of the last candidate checked.
    pub fn first_match(&self, tree: &UiTree) -> Result<NodeHandle, NotFound> {
        let mut last = NotFound::new(self.to_string(), "anchor set has no candidates");
        for candidate in &self.candidates {
            match candidate.find_in(tree) {
                Ok(handle) => return Ok(handle),
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}

impl fmt::Display for AnchorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "any of [")?;
        for (i, c) in self.candidates.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

impl<'a> IntoIterator for &'a AnchorSet {
    type Item = &'a Locator;
    type IntoIter = std::slice::Iter<'a, Locator>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

fn java_literal(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
