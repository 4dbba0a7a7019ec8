//! The protocol surface tree collection and element resolution need from a browser.
//!
//! `CdpSession` implements it over a live page. Tests implement it in memory.

use crate::accessibility::{FrameRef, RawAxNode};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// One node of `Page.getFrameTree`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTreeInfo {
    pub id: FrameRef,
    pub url: String,
    pub children: Vec<FrameTreeInfo>,
}

impl FrameTreeInfo {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: FrameRef::new(id),
            url: url.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<FrameTreeInfo>) -> Self {
        self.children = children;
        self
    }

    /// Frame ids in depth-first order, this frame first.
    pub fn frame_ids(&self) -> Vec<FrameRef> {
        let mut ids = vec![self.id.clone()];
        for child in &self.children {
            ids.extend(child.frame_ids());
        }
        ids
    }

    pub fn urls(&self) -> Vec<&str> {
        let mut urls = vec![self.url.as_str()];
        for child in &self.children {
            urls.extend(child.urls());
        }
        urls
    }
}

/// An entry of `Target.getTargets`.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetInfo {
    pub target_id: String,
    pub target_type: String,
    pub url: String,
}

/// A frame as the page itself enumerates it, which can include frames the frame tree
/// never reports.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFrame {
    pub frame: FrameRef,
    pub url: String,
}

/// Text and `aria-label` of one element matched by a selector query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueriedElement {
    pub text: String,
    pub aria_label: Option<String>,
}

/// Calls are issued one at a time; implementations may keep "current frame" state
/// between `switch_*` calls and `find_css`.
#[async_trait]
pub trait ChromiumSession: Send + Sync {
    /// Live element handle
    type Element: Clone + Send + Sync + Debug;

    async fn frame_tree(&self) -> Result<FrameTreeInfo>;

    /// Backend node id of the `<iframe>` that owns `frame`.
    async fn frame_owner(&self, frame: &FrameRef) -> Result<i64>;

    async fn full_ax_tree(&self, frame: &FrameRef) -> Result<Vec<RawAxNode>>;

    async fn targets(&self) -> Result<Vec<TargetInfo>>;

    async fn page_frames(&self) -> Result<Vec<PageFrame>>;

    /// Backend node id of the first `<iframe>` whose `src` is `url`.
    async fn iframe_backend_node_id_by_url(&self, url: &str) -> Result<Option<i64>>;

    /// Elements matching `selector` inside `frame`, at most `limit` of them.
    async fn query_elements(
        &self,
        frame: &FrameRef,
        selector: &str,
        limit: usize,
    ) -> Result<Vec<QueriedElement>>;

    /// Makes `backend_node_id` known to the active document and returns its node id.
    async fn push_backend_node(&self, backend_node_id: i64) -> Result<i64>;

    async fn set_attribute(&self, node_id: i64, name: &str, value: &str) -> Result<()>;

    async fn remove_attribute(&self, node_id: i64, name: &str) -> Result<()>;

    async fn switch_to_default_content(&self) -> Result<()>;

    async fn switch_to_frame(&self, iframe: &Self::Element) -> Result<()>;

    /// First element matching `selector` in the current frame.
    async fn find_css(&self, selector: &str) -> Result<Self::Element>;

    async fn find_nth(&self, frame: &FrameRef, selector: &str, nth: usize)
        -> Result<Self::Element>;

    async fn find_by_role(
        &self,
        frame: &FrameRef,
        role: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self::Element>;

    async fn frame_body(&self, frame: &FrameRef) -> Result<Self::Element>;
}
