//! Normalized node graph shared by all tree builders.

use super::xml;

/// One normalized node: role or class as the tag, ordered attributes, children in
/// document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreeNode {
    pub tag: String,
    /// Identifier within one tree; 0 until numbered
    pub raw_id: u32,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<TreeNode>,
    pub text: Option<String>,
}

impl TreeNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing an existing value in place so order is kept.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }
}

/// Number a forest in pre-order starting at 1.
///
/// The counter is local to the call, so a parent always gets a lower id than any of
/// its descendants and two builds of the same shape get the same ids.
pub fn assign_raw_ids(roots: &mut [TreeNode]) {
    let mut counter = 0;
    for root in roots.iter_mut() {
        number(root, &mut counter);
    }
}

fn number(node: &mut TreeNode, counter: &mut u32) {
    *counter += 1;
    node.raw_id = *counter;
    for child in node.children.iter_mut() {
        number(child, counter);
    }
}

/// Depth-first, pre-order search by raw_id.
pub fn find_by_raw_id(roots: &[TreeNode], raw_id: u32) -> Option<&TreeNode> {
    let mut pending: Vec<&TreeNode> = roots.iter().rev().collect();
    while let Some(node) = pending.pop() {
        if node.raw_id == raw_id {
            return Some(node);
        }
        pending.extend(node.children.iter().rev());
    }
    None
}

/// A numbered forest together with its memoized serialization.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    roots: Vec<TreeNode>,
    xml: String,
}

impl Snapshot {
    /// Number an unnumbered forest and serialize it.
    pub fn numbered(mut roots: Vec<TreeNode>) -> Self {
        assign_raw_ids(&mut roots);
        Self::from_numbered(roots)
    }

    /// Serialize a forest whose raw_ids are already assigned.
    pub fn from_numbered(roots: Vec<TreeNode>) -> Self {
        let xml = xml::serialize(&roots);
        Self { roots, xml }
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn find(&self, raw_id: u32) -> Option<&TreeNode> {
        find_by_raw_id(&self.roots, raw_id)
    }

    /// The subtree rooted at `raw_id`, keeping the original raw_ids.
    pub fn scoped(&self, raw_id: u32) -> Option<Snapshot> {
        self.find(raw_id)
            .map(|node| Self::from_numbered(vec![node.clone()]))
    }
}
