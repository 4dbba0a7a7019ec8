use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a browsing context (a CDP frame id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRef(pub String);

impl FrameRef {
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self(frame_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How to find a node that the accessibility protocol never reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorInfo {
    /// Stand-in for a whole frame; resolves to that frame's body
    SyntheticFrame { frame_url: String },
    /// The `nth` match (0-based) of a CSS selector inside the owning frame
    Nth { selector: String, nth: usize },
    /// Accessible role and/or name inside the owning frame
    Role {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// Backend-agnostic projection of one tree node, carrying what a resolver needs to
/// find the live element again.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessibilityElement {
    pub id: Option<u32>,
    /// Chromium backend DOM node id
    pub backend_node_id: Option<i64>,
    pub name: Option<String>,
    pub label: Option<String>,
    /// Role, XCUIElementType or Android class
    #[serde(rename = "type")]
    pub element_type: Option<String>,
    pub value: Option<String>,
    pub android_resource_id: Option<String>,
    pub android_class: Option<String>,
    pub android_text: Option<String>,
    pub android_content_desc: Option<String>,
    pub android_bounds: Option<String>,
    /// Browsing context that owns the element (Chromium only)
    pub frame: Option<FrameRef>,
    pub locator_info: Option<LocatorInfo>,
    /// Owning iframe backend node ids from the top document down; empty in the top frame
    pub frame_chain: Vec<i64>,
}
