//! Accessibility trees for Chromium, Android and iOS behind one type.
//!
//! A tree is built once per snapshot. Its text form is computed lazily and cached, and
//! every node carries a `raw_id` that is only meaningful for that tree instance.

pub mod chromium;
pub mod diff;
pub mod element;
pub mod node;
pub mod uiautomator2;
pub mod xcuitest;
pub mod xml;

pub use chromium::{ChromiumTree, RawAxNode};
pub use diff::{ChangeKind, NodeChange, TreeDiff};
pub use element::{AccessibilityElement, FrameRef, LocatorInfo};
pub use uiautomator2::UiAutomator2Tree;
pub use xcuitest::XcuiTestTree;

use crate::error::Result;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Chromium,
    UiAutomator2,
    XcuiTest,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Chromium => "chromium",
            Platform::UiAutomator2 => "uiautomator2",
            Platform::XcuiTest => "xcuitest",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum AccessibilityTree {
    Chromium(ChromiumTree),
    UiAutomator2(UiAutomator2Tree),
    XcuiTest(XcuiTestTree),
}

impl AccessibilityTree {
    pub fn platform(&self) -> Platform {
        match self {
            AccessibilityTree::Chromium(_) => Platform::Chromium,
            AccessibilityTree::UiAutomator2(_) => Platform::UiAutomator2,
            AccessibilityTree::XcuiTest(_) => Platform::XcuiTest,
        }
    }

    /// Serialized tree. Repeated calls return the same cached string.
    pub fn to_str(&self) -> &str {
        match self {
            AccessibilityTree::Chromium(tree) => tree.to_str(),
            AccessibilityTree::UiAutomator2(tree) => tree.to_str(),
            AccessibilityTree::XcuiTest(tree) => tree.to_str(),
        }
    }

    pub fn element_by_id(&self, raw_id: u32) -> Result<AccessibilityElement> {
        match self {
            AccessibilityTree::Chromium(tree) => tree.element_by_id(raw_id),
            AccessibilityTree::UiAutomator2(tree) => tree.element_by_id(raw_id),
            AccessibilityTree::XcuiTest(tree) => tree.element_by_id(raw_id),
        }
    }

    /// Subtree rooted at `raw_id` with the original ids kept.
    ///
    /// An unknown id yields `self` unchanged (as `Cow::Borrowed`).
    pub fn scope_to_area(&self, raw_id: u32) -> Cow<'_, AccessibilityTree> {
        match self {
            AccessibilityTree::Chromium(tree) => match tree.scope_to_area(raw_id) {
                Cow::Owned(scoped) => Cow::Owned(AccessibilityTree::Chromium(scoped)),
                Cow::Borrowed(_) => Cow::Borrowed(self),
            },
            AccessibilityTree::UiAutomator2(tree) => match tree.scope_to_area(raw_id) {
                Cow::Owned(scoped) => Cow::Owned(AccessibilityTree::UiAutomator2(scoped)),
                Cow::Borrowed(_) => Cow::Borrowed(self),
            },
            AccessibilityTree::XcuiTest(tree) => match tree.scope_to_area(raw_id) {
                Cow::Owned(scoped) => Cow::Owned(AccessibilityTree::XcuiTest(scoped)),
                Cow::Borrowed(_) => Cow::Borrowed(self),
            },
        }
    }
}

impl From<ChromiumTree> for AccessibilityTree {
    fn from(tree: ChromiumTree) -> Self {
        AccessibilityTree::Chromium(tree)
    }
}

impl From<UiAutomator2Tree> for AccessibilityTree {
    fn from(tree: UiAutomator2Tree) -> Self {
        AccessibilityTree::UiAutomator2(tree)
    }
}

impl From<XcuiTestTree> for AccessibilityTree {
    fn from(tree: XcuiTestTree) -> Self {
        AccessibilityTree::XcuiTest(tree)
    }
}
