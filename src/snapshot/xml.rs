//! UiAutomator hierarchy dumps.
//!
//! Android backends return the page source as an XML document whose element
//! names are either `node` (raw `uiautomator dump`) or the widget class
//! (Appium's UiAutomator2 driver). Only the handful of attributes the engine
//! matches on are kept.

use std::fmt::Write as _;

use super::types::{BackendError, BackendResult, Bounds, UiNode, UiTree};

const ROOT_TAG: &str = "hierarchy";

struct Frame {
    tag: String,
    /// `None` for the transparent `<hierarchy>` wrapper
    node: Option<UiNode>,
}

impl Frame {
    fn open(tag: &str, attrs: Vec<(String, String)>) -> Self {
        if tag == ROOT_TAG {
            return Self {
                tag: tag.to_string(),
                node: None,
            };
        }

        let mut node = UiNode::new(if tag == "node" { "" } else { tag });
        for (key, value) in attrs {
            match key.as_str() {
                "class" => node.class = value,
                "text" => node.text = value,
                "content-desc" => node.content_desc = value,
                "resource-id" => node.resource_id = value,
                "bounds" => node.bounds = Bounds::parse(&value),
                "scrollable" => node.scrollable = value == "true",
                _ => {}
            }
        }
        Self {
            tag: tag.to_string(),
            node: Some(node),
        }
    }
}

fn malformed(message: impl Into<String>) -> BackendError {
    BackendError::decode("source", message)
}

/// Parse a hierarchy dump into a [`UiTree`]
pub fn tree_from_xml(xml: &str) -> BackendResult<UiTree> {
    let mut roots = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut rest = xml;

    while let Some(lt) = rest.find('<') {
        rest = &rest[lt..];

        if rest.starts_with("<?") {
            rest = skip_past(rest, "?>")?;
            continue;
        }
        if rest.starts_with("<!--") {
            rest = skip_past(rest, "-->")?;
            continue;
        }
        if rest.starts_with("<!") {
            rest = skip_past(rest, ">")?;
            continue;
        }

        if let Some(after) = rest.strip_prefix("</") {
            let end = after
                .find('>')
                .ok_or_else(|| malformed("unterminated end tag"))?;
            let name = after[..end].trim();
            let frame = stack
                .pop()
                .ok_or_else(|| malformed(format!("unexpected </{}>", name)))?;
            if frame.tag != name {
                return Err(malformed(format!(
                    "expected </{}>, found </{}>",
                    frame.tag, name
                )));
            }
            attach(&mut stack, &mut roots, frame);
            rest = &after[end + 1..];
            continue;
        }

        let end = tag_end(rest)?;
        let body = &rest[1..end];
        let (body, self_closing) = match body.trim_end().strip_suffix('/') {
            Some(b) => (b, true),
            None => (body, false),
        };
        let (tag, attrs) = parse_tag(body)?;
        let frame = Frame::open(tag, attrs);
        if self_closing {
            attach(&mut stack, &mut roots, frame);
        } else {
            stack.push(frame);
        }
        rest = &rest[end + 1..];
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("unclosed <{}>", open.tag)));
    }
    Ok(UiTree::new(roots))
}

fn attach(stack: &mut [Frame], roots: &mut Vec<UiNode>, frame: Frame) {
    let Some(node) = frame.node else {
        return;
    };
    match stack.last_mut().and_then(|parent| parent.node.as_mut()) {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn skip_past<'a>(input: &'a str, terminator: &str) -> BackendResult<&'a str> {
    input
        .find(terminator)
        .map(|i| &input[i + terminator.len()..])
        .ok_or_else(|| malformed(format!("missing {:?}", terminator)))
}

/// Index of the `>` closing the tag at the start of `input`, ignoring quoted `>`
fn tag_end(input: &str) -> BackendResult<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Ok(i),
            _ => {}
        }
    }
    Err(malformed("unterminated tag"))
}

fn parse_tag(body: &str) -> BackendResult<(&str, Vec<(String, String)>)> {
    let body = body.trim();
    let name_end = body.find(char::is_whitespace).unwrap_or(body.len());
    let name = &body[..name_end];
    if name.is_empty() {
        return Err(malformed("empty tag name"));
    }

    let mut attrs = Vec::new();
    let mut rest = body[name_end..].trim_start();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| malformed(format!("attribute without value in <{}>", name)))?;
        let key = rest[..eq].trim().to_string();
        let after = rest[eq + 1..].trim_start();
        let quote = after
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| malformed(format!("unquoted attribute {} in <{}>", key, name)))?;
        let close = after[1..]
            .find(quote)
            .ok_or_else(|| malformed(format!("unterminated attribute {}", key)))?;
        attrs.push((key, unescape(&after[1..1 + close])));
        rest = after[close + 2..].trim_start();
    }
    Ok((name, attrs))
}

fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {
                let _ = write!(out, "&#{};", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Serialize a tree as a well-formed UiAutomator-style dump
pub fn tree_to_xml(tree: &UiTree) -> String {
    let mut out = String::from("<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>\n");
    out.push_str("<hierarchy rotation=\"0\">\n");
    for (index, node) in tree.roots.iter().enumerate() {
        write_node(&mut out, node, index, 1);
    }
    out.push_str("</hierarchy>\n");
    out
}

fn write_node(out: &mut String, node: &UiNode, index: usize, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = write!(
        out,
        "{}<node index=\"{}\" class=\"{}\" text=\"{}\" resource-id=\"{}\" content-desc=\"{}\" scrollable=\"{}\"",
        indent,
        index,
        escape(&node.class),
        escape(&node.text),
        escape(&node.resource_id),
        escape(&node.content_desc),
        node.scrollable
    );
    if let Some(bounds) = node.bounds {
        let _ = write!(out, " bounds=\"{}\"", bounds);
    }

    if node.children.is_empty() {
        out.push_str(" />\n");
        return;
    }
    out.push_str(">\n");
    for (i, child) in node.children.iter().enumerate() {
        write_node(out, child, i, depth + 1);
    }
    let _ = writeln!(out, "{}</node>", indent);
}
