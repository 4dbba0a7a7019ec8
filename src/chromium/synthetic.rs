//! Nodes for frames the accessibility protocol cannot enumerate.
//!
//! Such frames are queried with a fixed list of interactive-element selectors and each
//! named match becomes a synthetic node that remembers its selector and position. All
//! nodes of one frame hang under a synthetic frame node.

use super::session::{ChromiumSession, QueriedElement, TargetInfo};
use crate::accessibility::{FrameRef, LocatorInfo, RawAxNode};
use std::collections::HashSet;

/// Selector and the role its matches are reported with.
pub const INTERACTIVE_SELECTORS: &[(&str, &str)] = &[
    ("button", "button"),
    ("a", "link"),
    ("[role='button']", "button"),
    ("[role='link']", "link"),
    ("input[type='submit']", "button"),
    ("input:not([type='hidden'])", "textbox"),
    ("select", "combobox"),
    ("textarea", "textbox"),
    ("[aria-label]", "generic"),
];

pub const FRAME_ROLE: &str = "Iframe";
const FRAME_NAME_URL_LEN: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticQuery {
    /// Matches kept per selector
    pub per_selector_limit: usize,
    /// Names are cut to this many characters
    pub max_name_len: usize,
}

impl Default for SyntheticQuery {
    fn default() -> Self {
        Self {
            per_selector_limit: 20,
            max_name_len: 50,
        }
    }
}

/// Negative node ids, so they never collide with protocol ids.
#[derive(Debug)]
pub struct SyntheticIds(i64);

impl Default for SyntheticIds {
    fn default() -> Self {
        Self(-1)
    }
}

impl SyntheticIds {
    pub fn next_id(&mut self) -> i64 {
        let id = self.0;
        self.0 -= 1;
        id
    }
}

/// `iframe` targets whose URL the frame tree does not already cover.
pub fn oopif_targets(targets: &[TargetInfo], known_urls: &HashSet<&str>) -> Vec<TargetInfo> {
    targets
        .iter()
        .filter(|target| target.target_type == "iframe")
        .filter(|target| !target.url.is_empty() && !known_urls.contains(target.url.as_str()))
        .inspect(|target| log::debug!("Detected cross-process frame target: {}", target.url))
        .cloned()
        .collect()
}

/// `aria-label` if present, otherwise the trimmed and shortened text content.
pub fn accessible_name(element: &QueriedElement, max_len: usize) -> String {
    match element.aria_label.as_deref().filter(|label| !label.is_empty()) {
        Some(label) => label.to_string(),
        None => truncate(element.text.trim(), max_len),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Query one frame and return its synthetic frame node followed by the element nodes.
///
/// Failures of individual selectors are skipped; a frame that yields nothing still
/// gets its frame node.
pub async fn frame_nodes<S>(
    session: &S,
    frame: &FrameRef,
    url: &str,
    query: &SyntheticQuery,
    ids: &mut SyntheticIds,
) -> Vec<RawAxNode>
where
    S: ChromiumSession + ?Sized,
{
    let owner = match session.iframe_backend_node_id_by_url(url).await {
        Ok(owner) => owner,
        Err(e) => {
            log::debug!("Could not find the iframe for {}: {}", url, e);
            None
        }
    };
    let frame_chain: Vec<i64> = owner.into_iter().collect();

    let container_id = ids.next_id().to_string();
    let mut children = Vec::new();

    for &(selector, role) in INTERACTIVE_SELECTORS {
        let matches = match session
            .query_elements(frame, selector, query.per_selector_limit)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                log::debug!("Selector {} failed in {}: {}", selector, frame, e);
                continue;
            }
        };

        for (nth, element) in matches.iter().take(query.per_selector_limit).enumerate() {
            let name = accessible_name(element, query.max_name_len);
            if name.is_empty() {
                continue;
            }

            let locator = LocatorInfo::Nth {
                selector: selector.to_string(),
                nth,
            };
            let mut node =
                RawAxNode::synthetic(ids.next_id(), role, &name, locator, Some(frame.clone()));
            node.parent_id = Some(container_id.clone());
            node.frame_chain = frame_chain.clone();
            children.push(node);
        }
    }
    log::debug!("Created {} synthetic nodes for {}", children.len(), url);

    let mut container = RawAxNode::synthetic(
        0,
        FRAME_ROLE,
        &format!("Embedded frame: {}", truncate(url, FRAME_NAME_URL_LEN)),
        LocatorInfo::SyntheticFrame {
            frame_url: url.to_string(),
        },
        Some(frame.clone()),
    );
    container.node_id = container_id;
    container.child_ids = Some(children.iter().map(|child| child.node_id.clone()).collect());
    container.frame_chain = frame_chain;
    container.parent_iframe_backend_node_id = owner;

    let mut nodes = Vec::with_capacity(children.len() + 1);
    nodes.push(container);
    nodes.extend(children);
    nodes
}
