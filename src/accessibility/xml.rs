//! Canonical text form of a tree.
//!
//! Every node renders as one tagged element carrying its attributes plus `raw_id`,
//! indented two spaces per level. Parsing is deliberately forgiving because page
//! sources coming back from devices are not always well formed.

use super::node::TreeNode;
use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::borrow::Cow;

pub const RAW_ID_ATTRIBUTE: &str = "raw_id";

/// Escape `&`, `<`, `>`, `"` and `'` exactly once.
pub fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Serialize a forest, one node per line.
pub fn serialize(roots: &[TreeNode]) -> String {
    let mut out = String::new();
    for root in roots {
        write_node(&mut out, root, 0);
    }
    out
}

fn write_node(out: &mut String, node: &TreeNode, depth: usize) {
    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    out.push('<');
    out.push_str(&node.tag);

    for (name, value) in &node.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }
    if node.raw_id > 0 {
        out.push_str(&format!(" {}=\"{}\"", RAW_ID_ATTRIBUTE, node.raw_id));
    }

    let text = node.text.as_deref().filter(|t| !t.is_empty());
    if node.children.is_empty() && text.is_none() {
        out.push_str(" />\n");
        return;
    }

    out.push('>');
    if let Some(text) = text {
        out.push_str(&escape(text));
    }
    if !node.children.is_empty() {
        out.push('\n');
        for child in &node.children {
            write_node(out, child, depth + 1);
        }
        out.push_str(&indent);
    }
    out.push_str("</");
    out.push_str(&node.tag);
    out.push_str(">\n");
}

/// Parse XML-ish text into a forest.
///
/// Closing tags that do not match the innermost open element are skipped, elements
/// still open at the end of input are closed implicitly, and a syntax error stops
/// parsing while keeping everything read so far.
pub fn parse_lenient(xml: &str) -> Vec<TreeNode> {
    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.trim_text(true);

    let mut roots: Vec<TreeNode> = Vec::new();
    let mut stack: Vec<TreeNode> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(node_from_start(&start)),
            Ok(Event::Empty(start)) => attach(node_from_start(&start), &mut stack, &mut roots),
            Ok(Event::End(end)) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                let matches_top = stack.last().is_some_and(|open| open.tag == name);
                if !matches_top {
                    debug!("Ignoring unmatched closing tag </{}>", name);
                    continue;
                }
                if let Some(node) = stack.pop() {
                    attach(node, &mut stack, &mut roots);
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(open) = stack.last_mut() {
                    match text.unescape() {
                        Ok(text) => push_text(open, &text),
                        Err(e) => debug!("Skipping undecodable text: {}", e),
                    }
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(open) = stack.last_mut() {
                    push_text(open, &String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(
                    "Stopping XML parse at position {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            // Declarations, comments, doctypes and processing instructions carry no nodes
            Ok(_) => {}
        }
    }

    while let Some(node) = stack.pop() {
        attach(node, &mut stack, &mut roots);
    }

    roots
}

fn attach(node: TreeNode, stack: &mut [TreeNode], roots: &mut Vec<TreeNode>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn push_text(node: &mut TreeNode, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match &mut node.text {
        Some(existing) => existing.push_str(text),
        None => node.text = Some(text.to_string()),
    }
}

fn node_from_start(start: &BytesStart<'_>) -> TreeNode {
    let mut node = TreeNode::new(String::from_utf8_lossy(start.name().as_ref()));

    for attribute in start.attributes().with_checks(false) {
        let attribute = match attribute {
            Ok(attribute) => attribute,
            Err(e) => {
                debug!("Skipping malformed attribute on <{}>: {}", node.tag, e);
                continue;
            }
        };
        let name = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = match attribute.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attribute.value).into_owned(),
        };

        if name == RAW_ID_ATTRIBUTE {
            if let Ok(raw_id) = value.parse::<u32>() {
                node.raw_id = raw_id;
                continue;
            }
        }
        node.attributes.push((name, value));
    }

    node
}
