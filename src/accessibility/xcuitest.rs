//! iOS XCUITest page sources.

use super::element::AccessibilityElement;
use super::node::Snapshot;
use super::xml;
use crate::error::{A11yError, Result};
use std::borrow::Cow;
use std::sync::OnceLock;

/// Tree built from a single well-formed XCUITest page-source document.
#[derive(Debug, Clone)]
pub struct XcuiTestTree {
    source: String,
    snapshot: OnceLock<Snapshot>,
}

impl XcuiTestTree {
    pub fn new(page_source: impl Into<String>) -> Self {
        Self {
            source: page_source.into(),
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

        Ok(AccessibilityElement {
            id: Some(raw_id),
            element_type: Some(node.tag.clone()),
            name: node.attribute("name").map(str::to_string),
            label: node.attribute("label").map(str::to_string),
            value: node.attribute("value").map(str::to_string),
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
