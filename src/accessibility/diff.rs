//! Differences between two serialized Chromium trees of the same page.

use super::chromium::BACKEND_NODE_ATTRIBUTE;
use super::node::TreeNode;
use super::xml;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Attributes whose change means the node changed state.
const STATE_ATTRIBUTES: &[&str] = &[
    "value", "checked", "selected", "expanded", "focused", "pressed", "disabled", "invalid",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeChange {
    pub kind: ChangeKind,
    pub role: String,
    pub name: Option<String>,
    pub backend_node_id: String,
    /// `attr: old → new` pairs, only for modified nodes
    pub details: String,
}

impl fmt::Display for NodeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.kind {
            ChangeKind::Added => "+ Added",
            ChangeKind::Removed => "- Removed",
            ChangeKind::Modified => "~ Modified",
        };
        write!(f, "{}: {}", marker, self.role)?;
        if let Some(name) = &self.name {
            write!(f, " \"{}\"", name)?;
        }
        write!(f, " (id={})", self.backend_node_id)?;
        if self.kind == ChangeKind::Modified {
            write!(f, " [{}]", self.details)?;
        }
        Ok(())
    }
}

/// Nodes are matched by backend DOM node id; nodes without one are not compared.
pub struct TreeDiff {
    before: String,
    after: String,
    changes: OnceLock<Vec<NodeChange>>,
}

impl TreeDiff {
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
            changes: OnceLock::new(),
        }
    }

    /// Removed nodes first, then added, then modified, each in document order.
    pub fn changes(&self) -> &[NodeChange] {
        self.changes
            .get_or_init(|| compute_changes(&self.before, &self.after))
    }

    pub fn is_empty(&self) -> bool {
        self.changes().is_empty()
    }

    pub fn summary(&self) -> String {
        let changes = self.changes();
        if changes.is_empty() {
            return "No changes detected.".to_string();
        }

        let mut lines = vec!["ACCESSIBILITY TREE CHANGES:".to_string()];
        lines.extend(changes.iter().map(NodeChange::to_string));

        let count = |kind| changes.iter().filter(|c| c.kind == kind).count();
        lines.push(format!(
            "\nSummary: {} added, {} removed, {} modified",
            count(ChangeKind::Added),
            count(ChangeKind::Removed),
            count(ChangeKind::Modified)
        ));
        lines.join("\n")
    }
}

struct KeyedNodes<'a> {
    order: Vec<&'a str>,
    by_key: HashMap<&'a str, &'a TreeNode>,
}

impl<'a> KeyedNodes<'a> {
    fn collect(roots: &'a [TreeNode]) -> Self {
        let mut keyed = Self {
            order: Vec::new(),
            by_key: HashMap::new(),
        };
        let mut pending: Vec<&TreeNode> = roots.iter().rev().collect();
        while let Some(node) = pending.pop() {
            if let Some(key) = node.attribute(BACKEND_NODE_ATTRIBUTE) {
                if keyed.by_key.insert(key, node).is_none() {
                    keyed.order.push(key);
                }
            }
            pending.extend(node.children.iter().rev());
        }
        keyed
    }

    fn iter(&self) -> impl Iterator<Item = (&'a str, &'a TreeNode)> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.by_key.get(key).map(|node| (*key, *node)))
    }

    fn get(&self, key: &str) -> Option<&'a TreeNode> {
        self.by_key.get(key).copied()
    }
}

fn compute_changes(before: &str, after: &str) -> Vec<NodeChange> {
    let before_roots = xml::parse_lenient(before);
    let after_roots = xml::parse_lenient(after);
    let before = KeyedNodes::collect(&before_roots);
    let after = KeyedNodes::collect(&after_roots);

    let mut changes = Vec::new();
    for (key, node) in before.iter() {
        if after.get(key).is_none() {
            changes.push(change(ChangeKind::Removed, key, node, String::new()));
        }
    }
    for (key, node) in after.iter() {
        if before.get(key).is_none() {
            changes.push(change(ChangeKind::Added, key, node, String::new()));
        }
    }
    for (key, node) in after.iter() {
        if let Some(old) = before.get(key) {
            let details = state_diff(old, node);
            if !details.is_empty() {
                changes.push(change(ChangeKind::Modified, key, node, details));
            }
        }
    }
    changes
}

fn change(kind: ChangeKind, key: &str, node: &TreeNode, details: String) -> NodeChange {
    NodeChange {
        kind,
        role: node.tag.clone(),
        name: node
            .attribute("name")
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        backend_node_id: key.to_string(),
        details,
    }
}

fn state_diff(before: &TreeNode, after: &TreeNode) -> String {
    let mut diffs = Vec::new();

    let old_name = before.attribute("name").unwrap_or_default();
    let new_name = after.attribute("name").unwrap_or_default();
    if old_name != new_name {
        diffs.push(format!("name: \"{}\" → \"{}\"", old_name, new_name));
    }

    for attribute in STATE_ATTRIBUTES {
        let old = before.attribute(attribute);
        let new = after.attribute(attribute);
        if old != new {
            diffs.push(format!(
                "{}: {} → {}",
                attribute,
                old.unwrap_or("unset"),
                new.unwrap_or("unset")
            ));
        }
    }

    diffs.join(", ")
}
