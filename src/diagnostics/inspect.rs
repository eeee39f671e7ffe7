//! Offline inspection of saved tree dumps, for picking locators.

use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::snapshot::types::UiTree;

/// Rows shown by [`print_inspection`]
pub const INSPECT_LIMIT: usize = 40;

/// A node carrying at least one attribute a locator could use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectRow {
    pub class: String,
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
}

/// Newest `*.xml` in `dir`, by modification time
pub fn latest_tree_dump(dir: &Path) -> io::Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("xml") {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Nodes with a resource id, text, or content description, in tree order.
///
/// `filter` keeps only rows where one of those three contains it.
pub fn identifying_nodes(tree: &UiTree, filter: Option<&str>) -> Vec<InspectRow> {
    tree.walk()
        .into_iter()
        .map(|(_, node)| InspectRow {
            class: node.class.clone(),
            resource_id: node.resource_id.clone(),
            text: node.text.clone(),
            content_desc: node.content_desc.clone(),
        })
        .filter(|row| !(row.resource_id.is_empty() && row.text.is_empty() && row.content_desc.is_empty()))
        .filter(|row| match filter {
            Some(needle) => {
                row.resource_id.contains(needle)
                    || row.text.contains(needle)
                    || row.content_desc.contains(needle)
            }
            None => true,
        })
        .collect()
}

/// Print at most `limit` rows in a human-readable listing
pub fn print_inspection(rows: &[InspectRow], limit: usize, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "elements with resource-id/text/content-desc: {}", rows.len())?;
    writeln!(out, "\n--- TOP {} ---", limit)?;
    for (i, row) in rows.iter().take(limit).enumerate() {
        writeln!(out, "{:02}. class={:?}", i + 1, row.class)?;
        if !row.resource_id.is_empty() {
            writeln!(out, "    resource-id: {:?}", row.resource_id)?;
        }
        if !row.text.is_empty() {
            writeln!(out, "    text: {:?}", row.text)?;
        }
        if !row.content_desc.is_empty() {
            writeln!(out, "    content-desc: {:?}", row.content_desc)?;
        }
    }
    Ok(())
}
