//! Failure diagnostics.
//!
//! Invoked from a runner's failure hook, never from engine control flow.
//! Nothing in here returns an error: a diagnostics failure must not mask the
//! failure being diagnosed.

pub mod inspect;
pub mod sink;

use serde::{Deserialize, Serialize};
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::snapshot::backend::UiBackend;
use crate::snapshot::utils::{artifact_filename, generate_timestamp};
use crate::snapshot::xml::tree_to_xml;

pub use inspect::{INSPECT_LIMIT, InspectRow, identifying_nodes, latest_tree_dump, print_inspection};
pub use sink::{ArtifactSink, FsArtifactSink};

/// Printed in place of a line the output refused
pub const UNPRINTABLE_PLACEHOLDER: &str = "<unprintable text>";

const DUMP_HEADER: &str = "===== VISIBLE TEXTS =====";
const DUMP_FOOTER: &str = "=========================";

/// What a capture managed to persist
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsBundle {
    pub screenshot_path: Option<PathBuf>,
    pub tree_path: Option<PathBuf>,

    /// First `limit` visible texts in tree order
    pub visible_texts: Vec<String>,

    /// Visible texts beyond the limit
    pub omitted: usize,
}

impl DiagnosticsBundle {
    /// Print the visible-text dump; best effort, never fails
    pub fn dump(&self, encoding: OutputEncoding, out: &mut dyn Write) -> usize {
        write_dump(&self.visible_texts, self.omitted, encoding, out)
    }
}

/// Character repertoire of the output stream receiving a text dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    Utf8,
    Latin1,
    Ascii,
}

impl OutputEncoding {
    /// Guess the terminal encoding from the locale environment
    pub fn detect() -> Self {
        let locale = ["LC_ALL", "LC_CTYPE", "LANG"]
            .iter()
            .filter_map(|name| env::var(name).ok())
            .find(|value| !value.is_empty());

        match locale.map(|l| l.to_lowercase()) {
            None => OutputEncoding::Utf8,
            Some(l) if l.contains("utf-8") || l.contains("utf8") => OutputEncoding::Utf8,
            Some(l) if l.contains("8859-1") || l.contains("latin1") => OutputEncoding::Latin1,
            Some(l) if l == "c" || l == "posix" => OutputEncoding::Ascii,
            Some(_) => OutputEncoding::Utf8,
        }
    }

    fn can_encode(self, c: char) -> bool {
        match self {
            OutputEncoding::Utf8 => true,
            OutputEncoding::Latin1 => (c as u32) <= 0xFF,
            OutputEncoding::Ascii => c.is_ascii(),
        }
    }

    /// Replace characters the encoding cannot represent with `?`
    pub fn sanitize(self, text: &str) -> String {
        text.chars()
            .map(|c| if self.can_encode(c) { c } else { '?' })
            .collect()
    }
}

/// Snapshot the backend and persist a screenshot plus a tree dump named
/// `<prefix>_<YYYYMMDD_HHMMSS>.{png,xml}`.
///
/// Screenshot and tree are queried independently so one failing does not
/// cost the other.
pub fn capture(
    backend: &mut dyn UiBackend,
    sink: &mut dyn ArtifactSink,
    prefix: &str,
    limit: usize,
) -> DiagnosticsBundle {
    let timestamp = generate_timestamp();
    let mut bundle = DiagnosticsBundle::default();

    match backend.query_screenshot() {
        Ok(png) => {
            let name = artifact_filename(prefix, &timestamp, "png");
            match sink.persist_image(&png, &name) {
                Ok(path) => {
                    info!(path = %path.display(), "artifact saved: screenshot");
                    bundle.screenshot_path = Some(path);
                }
                Err(e) => warn!(file = %name, error = %e, "failed to persist screenshot"),
            }
        }
        Err(e) => warn!(error = %e, "failed to take screenshot"),
    }

    match backend.query_tree() {
        Ok(tree) => {
            let name = artifact_filename(prefix, &timestamp, "xml");
            match sink.persist_text(&tree_to_xml(&tree), &name) {
                Ok(path) => {
                    info!(path = %path.display(), "artifact saved: page source");
                    bundle.tree_path = Some(path);
                }
                Err(e) => warn!(file = %name, error = %e, "failed to persist page source"),
            }

            let mut texts = tree.visible_texts();
            bundle.omitted = texts.len().saturating_sub(limit);
            texts.truncate(limit);
            bundle.visible_texts = texts;
        }
        Err(e) => warn!(error = %e, "failed to read page source"),
    }

    bundle
}

/// Print up to `limit` texts, one quoted line each, followed by a count of
/// the rest. Returns the number of lines printed successfully.
pub fn dump_visible_texts(
    texts: &[String],
    limit: usize,
    encoding: OutputEncoding,
    out: &mut dyn Write,
) -> usize {
    let shown = &texts[..texts.len().min(limit)];
    write_dump(shown, texts.len() - shown.len(), encoding, out)
}

fn write_dump(
    shown: &[String],
    omitted: usize,
    encoding: OutputEncoding,
    out: &mut dyn Write,
) -> usize {
    let _ = writeln!(out, "\n{}", DUMP_HEADER);
    let mut printed = 0;
    for text in shown {
        let safe = encoding.sanitize(text);
        if writeln!(out, "{:?}", safe).is_ok() {
            printed += 1;
        } else {
            let _ = writeln!(out, "{}", UNPRINTABLE_PLACEHOLDER);
        }
    }
    if omitted > 0 {
        let _ = writeln!(out, "... +{} more", omitted);
    }
    let _ = writeln!(out, "{}\n", DUMP_FOOTER);
    let _ = out.flush();
    printed
}
