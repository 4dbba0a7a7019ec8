//! Chromium accessibility tree assembled from one or more `Accessibility.getFullAXTree`
//! responses plus synthetic nodes for frames the protocol cannot see.

use super::element::{AccessibilityElement, FrameRef, LocatorInfo};
use super::node::{Snapshot, TreeNode};
use crate::error::{A11yError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

pub const BACKEND_NODE_ATTRIBUTE: &str = "backendDOMNodeId";
/// Marks nodes that were found by querying the DOM instead of the protocol
pub const SYNTHETIC_ATTRIBUTE: &str = "_synthetic";
/// JSON-encoded `LocatorInfo` of a synthetic node
pub const LOCATOR_ATTRIBUTE: &str = "_locator";
/// URL of a synthetic node that stands for a whole frame
pub const FRAME_URL_ATTRIBUTE: &str = "_frame_url";

/// `{ "value": ... }` wrapper the protocol uses for roles, names and property values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxValue {
    #[serde(default)]
    pub value: Option<Value>,
}

impl AxValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: Some(Value::String(value.into())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxProperty {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Option<AxValue>,
}

/// One node as reported by the protocol, plus the frame bookkeeping added while a
/// snapshot is collected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAxNode {
    pub node_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default, rename = "backendDOMNodeId")]
    pub backend_dom_node_id: Option<i64>,
    #[serde(default)]
    pub role: Option<AxValue>,
    #[serde(default)]
    pub name: Option<AxValue>,
    #[serde(default)]
    pub ignored: Option<bool>,
    #[serde(default)]
    pub properties: Option<Vec<AxProperty>>,
    #[serde(default)]
    pub child_ids: Option<Vec<String>>,

    /// Frame the node was read from
    #[serde(skip)]
    pub frame: Option<FrameRef>,
    /// Owning iframe backend node ids, top document first
    #[serde(skip)]
    pub frame_chain: Vec<i64>,
    /// For a frame's root node: backend node id of the `<iframe>` that embeds the frame
    #[serde(skip)]
    pub parent_iframe_backend_node_id: Option<i64>,
    /// Set for nodes discovered outside the protocol
    #[serde(skip)]
    pub synthetic: Option<LocatorInfo>,
}

impl RawAxNode {
    /// A node found by querying a frame's DOM directly.
    pub fn synthetic(
        node_id: i64,
        role: &str,
        name: &str,
        locator: LocatorInfo,
        frame: Option<FrameRef>,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            role: Some(AxValue::string(role)),
            name: Some(AxValue::string(name)),
            frame,
            synthetic: Some(locator),
            ..Default::default()
        }
    }

    fn role(&self) -> Option<&str> {
        self.role
            .as_ref()
            .and_then(|role| role.value.as_ref())
            .and_then(Value::as_str)
            .filter(|role| !role.is_empty())
    }

    fn name(&self) -> Option<&str> {
        self.name
            .as_ref()
            .and_then(|name| name.value.as_ref())
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    fn key(&self) -> NodeKey<'_> {
        (self.frame.as_ref().map(FrameRef::as_str), self.node_id.as_str())
    }
}

/// Protocol node ids repeat across frames, so nodes are keyed per frame.
type NodeKey<'a> = (Option<&'a str>, &'a str);

#[derive(Debug, Clone, Default)]
struct NodeContext {
    frame: Option<FrameRef>,
    frame_chain: Vec<i64>,
}

#[derive(Debug, Clone)]
struct Built {
    snapshot: Snapshot,
    contexts: Arc<HashMap<u32, NodeContext>>,
}

#[derive(Debug, Clone)]
pub struct ChromiumTree {
    nodes: Vec<RawAxNode>,
    built: OnceLock<Built>,
}

impl ChromiumTree {
    pub fn new(nodes: Vec<RawAxNode>) -> Self {
        Self {
            nodes,
            built: OnceLock::new(),
        }
    }

    /// Build from a raw `{"nodes": [...]}` protocol response.
    pub fn from_response(response: &Value) -> Result<Self> {
        let nodes = match response.get("nodes") {
            Some(nodes) => serde_json::from_value(nodes.clone())?,
            None => Vec::new(),
        };
        Ok(Self::new(nodes))
    }

    fn built(&self) -> &Built {
        self.built.get_or_init(|| TreeAssembler::new(&self.nodes).assemble())
    }

    pub fn to_str(&self) -> &str {
        self.built().snapshot.xml()
    }

    pub fn element_by_id(&self, raw_id: u32) -> Result<AccessibilityElement> {
        let built = self.built();
        let node = built
            .snapshot
            .find(raw_id)
            .ok_or(A11yError::NotFound(raw_id))?;
        let context = built.contexts.get(&raw_id).cloned().unwrap_or_default();

        let mut element = AccessibilityElement {
            id: Some(raw_id),
            element_type: Some(node.tag.clone()),
            name: node.attribute("name").map(str::to_string),
            frame: context.frame,
            frame_chain: context.frame_chain,
            ..Default::default()
        };

        if node.attribute(SYNTHETIC_ATTRIBUTE) == Some("true") {
            element.locator_info = Some(synthetic_locator(node, raw_id)?);
            return Ok(element);
        }

        let backend_node_id = node
            .attribute(BACKEND_NODE_ATTRIBUTE)
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or_else(|| A11yError::MalformedElement {
                raw_id,
                missing: BACKEND_NODE_ATTRIBUTE.to_string(),
            })?;
        element.backend_node_id = Some(backend_node_id);

        Ok(element)
    }

    pub fn scope_to_area(&self, raw_id: u32) -> Cow<'_, Self> {
        let built = self.built();
        match built.snapshot.scoped(raw_id) {
            Some(snapshot) => Cow::Owned(Self {
                nodes: Vec::new(),
                built: OnceLock::from(Built {
                    snapshot,
                    contexts: Arc::clone(&built.contexts),
                }),
            }),
            None => Cow::Borrowed(self),
        }
    }
}

fn synthetic_locator(node: &TreeNode, raw_id: u32) -> Result<LocatorInfo> {
    if let Some(frame_url) = node.attribute(FRAME_URL_ATTRIBUTE) {
        return Ok(LocatorInfo::SyntheticFrame {
            frame_url: frame_url.to_string(),
        });
    }

    match node.attribute(LOCATOR_ATTRIBUTE) {
        Some(json) => serde_json::from_str(json).map_err(|_| A11yError::MalformedElement {
            raw_id,
            missing: LOCATOR_ATTRIBUTE.to_string(),
        }),
        None => Ok(LocatorInfo::Role {
            role: Some(node.tag.clone()),
            name: node.attribute("name").map(str::to_string),
        }),
    }
}

/// One build pass over the merged node list. Owns the raw_id counter.
struct TreeAssembler<'a> {
    nodes: &'a [RawAxNode],
    lookup: HashMap<NodeKey<'a>, usize>,
    /// iframe backend node id -> root nodes of the frames it embeds
    iframe_children: HashMap<i64, Vec<usize>>,
    visited: Vec<bool>,
    counter: u32,
    contexts: HashMap<u32, NodeContext>,
}

impl<'a> TreeAssembler<'a> {
    fn new(nodes: &'a [RawAxNode]) -> Self {
        let mut lookup = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            lookup.entry(node.key()).or_insert(index);
        }

        Self {
            nodes,
            lookup,
            iframe_children: HashMap::new(),
            visited: vec![false; nodes.len()],
            counter: 0,
            contexts: HashMap::new(),
        }
    }

    fn assemble(mut self) -> Built {
        let embedded: HashSet<i64> = self
            .nodes
            .iter()
            .filter(|node| node.synthetic.is_none())
            .filter_map(|node| node.backend_dom_node_id)
            .collect();

        let mut top_level = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let has_parent = node
                .parent_id
                .as_deref()
                .is_some_and(|parent| self.lookup.contains_key(&(node.key().0, parent)));
            if has_parent {
                continue;
            }

            match node.parent_iframe_backend_node_id {
                Some(owner) if embedded.contains(&owner) => {
                    self.iframe_children.entry(owner).or_default().push(index)
                }
                _ => top_level.push(index),
            }
        }

        let mut roots = Vec::new();
        for index in top_level {
            if !self.visited[index] {
                roots.push(self.build_node(index));
            }
        }

        // Frames whose owning iframe was never reached still show up, at top level
        let mut stranded: Vec<usize> = self.iframe_children.values().flatten().copied().collect();
        stranded.sort_unstable();
        for index in stranded {
            if !self.visited[index] {
                roots.push(self.build_node(index));
            }
        }

        // Parent cycles are never reached from a root; surface them too
        for index in 0..self.nodes.len() {
            if !self.visited[index] {
                roots.push(self.build_node(index));
            }
        }

        Built {
            snapshot: Snapshot::from_numbered(roots),
            contexts: Arc::new(self.contexts),
        }
    }

    fn build_node(&mut self, index: usize) -> TreeNode {
        self.visited[index] = true;
        let raw = &self.nodes[index];

        let mut node = TreeNode::new(tag_for_role(raw.role()));
        self.counter += 1;
        node.raw_id = self.counter;

        if raw.frame.is_some() || !raw.frame_chain.is_empty() {
            self.contexts.insert(
                node.raw_id,
                NodeContext {
                    frame: raw.frame.clone(),
                    frame_chain: raw.frame_chain.clone(),
                },
            );
        }

        match &raw.synthetic {
            Some(LocatorInfo::SyntheticFrame { frame_url }) => {
                node.set_attribute(SYNTHETIC_ATTRIBUTE, "true");
                node.set_attribute(FRAME_URL_ATTRIBUTE, frame_url.as_str());
            }
            Some(locator) => {
                node.set_attribute(SYNTHETIC_ATTRIBUTE, "true");
                if let Ok(json) = serde_json::to_string(locator) {
                    node.set_attribute(LOCATOR_ATTRIBUTE, json);
                }
            }
            None => {}
        }

        if let Some(backend_node_id) = raw.backend_dom_node_id {
            node.set_attribute(BACKEND_NODE_ATTRIBUTE, backend_node_id.to_string());
        }
        if raw.synthetic.is_none() {
            node.set_attribute("nodeId", raw.node_id.as_str());
        }
        if let Some(ignored) = raw.ignored {
            node.set_attribute("ignored", ignored.to_string());
        }
        if let Some(name) = raw.name() {
            node.set_attribute("name", name);
        }
        for property in raw.properties.iter().flatten() {
            node.set_attribute(property.name.as_str(), property_value(property));
        }

        let frame = raw.key().0;
        for child_id in raw.child_ids.iter().flatten() {
            if let Some(&child) = self.lookup.get(&(frame, child_id.as_str())) {
                if !self.visited[child] {
                    node.children.push(self.build_node(child));
                }
            }
        }

        if raw.synthetic.is_none() {
            if let Some(embedded) = raw
                .backend_dom_node_id
                .and_then(|id| self.iframe_children.get(&id).cloned())
            {
                for child in embedded {
                    if !self.visited[child] {
                        node.children.push(self.build_node(child));
                    }
                }
            }
        }

        node
    }
}

/// Complex values such as node lists render as an empty string.
fn property_value(property: &AxProperty) -> String {
    match property.value.as_ref().and_then(|v| v.value.as_ref()) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Roles become element names; anything that is not a valid name character is replaced.
fn tag_for_role(role: Option<&str>) -> String {
    let role = role.unwrap_or("unknown");
    let mut tag: String = role
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !tag.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        tag.insert(0, '_');
    }
    tag
}
