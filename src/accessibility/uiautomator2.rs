//! Android UIAutomator2 page sources.

use super::element::AccessibilityElement;
use super::node::Snapshot;
use super::xml;
use crate::error::{A11yError, Result};
use std::borrow::Cow;
use std::sync::OnceLock;

/// Tree built from an Android page-source dump.
#[derive(Debug, Clone)]
pub struct UiAutomator2Tree {
    source: String,
    snapshot: OnceLock<Snapshot>,
}

impl UiAutomator2Tree {
    /// Some capture modes emit one XML declaration per root; all of them are dropped
    /// and the remaining content is wrapped in a single synthetic `<root>`.
    pub fn new(page_source: &str) -> Self {
        let content = page_source
            .lines()
            .filter(|line| !is_xml_declaration(line))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            source: format!("<root>\n{}\n</root>", content),
            snapshot: OnceLock::new(),
        }
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            source: String::new(),
            snapshot: OnceLock::from(snapshot),
        }
    }

    fn snapshot(&self) -> &Snapshot {
        self.snapshot
            .get_or_init(|| Snapshot::numbered(xml::parse_lenient(&self.source)))
    }

    pub fn to_str(&self) -> &str {
        self.snapshot().xml()
    }

    pub fn element_by_id(&self, raw_id: u32) -> Result<AccessibilityElement> {
        let node = self
            .snapshot()
            .find(raw_id)
            .ok_or(A11yError::NotFound(raw_id))?;

        let class = node.attribute("class").map(str::to_string);
        Ok(AccessibilityElement {
            id: Some(raw_id),
            element_type: Some(class.clone().unwrap_or_else(|| node.tag.clone())),
            android_class: class,
            android_resource_id: node.attribute("resource-id").map(str::to_string),
            android_text: node.attribute("text").map(str::to_string),
            android_content_desc: node.attribute("content-desc").map(str::to_string),
            android_bounds: node.attribute("bounds").map(str::to_string),
            ..Default::default()
        })
    }

    pub fn scope_to_area(&self, raw_id: u32) -> Cow<'_, Self> {
        match self.snapshot().scoped(raw_id) {
            Some(scoped) => Cow::Owned(Self::from_snapshot(scoped)),
            None => Cow::Borrowed(self),
        }
    }
}

fn is_xml_declaration(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("<?xml") && line.ends_with("?>")
}
