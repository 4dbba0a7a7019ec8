use super::session::{ChromiumSession, FrameTreeInfo};
use super::synthetic::{self, SyntheticIds, SyntheticQuery};
use crate::accessibility::{ChromiumTree, FrameRef, RawAxNode};
use crate::error::Result;
use std::collections::{HashMap, HashSet};

/// Which `<iframe>` owns each frame, and which frame contains it.
///
/// Rebuilt for every snapshot. A frame whose owner could not be determined has no
/// entry in the owner map.
#[derive(Debug, Clone, Default)]
pub struct FrameHierarchy {
    frame_to_iframe: HashMap<FrameRef, i64>,
    frame_parent: HashMap<FrameRef, FrameRef>,
}

impl FrameHierarchy {
    /// Walk the frame tree depth-first, asking the session for every child frame's owner.
    pub async fn build<S>(session: &S, tree: &FrameTreeInfo) -> Self
    where
        S: ChromiumSession + ?Sized,
    {
        let mut hierarchy = Self::default();
        let mut pending: Vec<(&FrameTreeInfo, Option<&FrameRef>)> = vec![(tree, None)];

        while let Some((frame, parent)) = pending.pop() {
            if let Some(parent) = parent {
                let owner = match session.frame_owner(&frame.id).await {
                    Ok(owner) => {
                        log::debug!("Frame {} owned by iframe backendNodeId={}", frame.id, owner);
                        Some(owner)
                    }
                    Err(e) => {
                        log::debug!("Could not get frame owner for {}: {}", frame.id, e);
                        None
                    }
                };
                hierarchy.record(frame.id.clone(), parent.clone(), owner);
            }

            for child in frame.children.iter().rev() {
                pending.push((child, Some(&frame.id)));
            }
        }

        hierarchy
    }

    pub fn record(&mut self, frame: FrameRef, parent: FrameRef, owner: Option<i64>) {
        if let Some(owner) = owner {
            self.frame_to_iframe.insert(frame.clone(), owner);
        }
        self.frame_parent.insert(frame, parent);
    }

    pub fn owner(&self, frame: &FrameRef) -> Option<i64> {
        self.frame_to_iframe.get(frame).copied()
    }

    /// Owning iframe backend node ids from the top document down to `frame`.
    ///
    /// Stops at the first frame without a known owner.
    pub fn frame_chain(&self, frame: &FrameRef) -> Vec<i64> {
        let mut chain = Vec::new();
        let mut current = frame;

        while let Some(&owner) = self.frame_to_iframe.get(current) {
            chain.push(owner);
            match self.frame_parent.get(current) {
                Some(parent) if chain.len() <= self.frame_parent.len() => current = parent,
                _ => break,
            }
        }

        chain.reverse();
        chain
    }
}

/// Gather every node of the page into one list: protocol nodes for each frame of the
/// frame tree, then synthetic nodes for cross-process frames, then synthetic nodes for
/// frames only the page itself reports.
///
/// Calls go out one after another on the same session.
pub async fn collect_nodes<S>(session: &S, query: &SyntheticQuery) -> Result<Vec<RawAxNode>>
where
    S: ChromiumSession + ?Sized,
{
    let tree = session.frame_tree().await?;
    let frame_ids = tree.frame_ids();
    log::debug!("Found {} frames", frame_ids.len());

    let hierarchy = FrameHierarchy::build(session, &tree).await;

    let mut nodes = Vec::new();
    for frame in &frame_ids {
        let frame_nodes = match session.full_ax_tree(frame).await {
            Ok(frame_nodes) => frame_nodes,
            Err(e) => {
                log::debug!("Skipping frame {}: {}", frame, e);
                continue;
            }
        };
        log::debug!("Frame {}: {} nodes", frame, frame_nodes.len());

        let chain = hierarchy.frame_chain(frame);
        let owner = hierarchy.owner(frame);
        for mut node in frame_nodes {
            node.frame = Some(frame.clone());
            node.frame_chain = chain.clone();
            if node.parent_id.is_none() {
                node.parent_iframe_backend_node_id = owner;
            }
            nodes.push(node);
        }
    }

    let known_urls: HashSet<&str> = tree.urls().into_iter().collect();
    let mut ids = SyntheticIds::default();

    let oopifs = match session.targets().await {
        Ok(targets) => synthetic::oopif_targets(&targets, &known_urls),
        Err(e) => {
            log::debug!("Could not list targets: {}", e);
            Vec::new()
        }
    };
    log::debug!("Found {} cross-process frames", oopifs.len());

    for target in &oopifs {
        let frame = FrameRef::new(target.target_id.as_str());
        let synthetic_nodes =
            synthetic::frame_nodes(session, &frame, &target.url, query, &mut ids).await;
        log::debug!(
            "Cross-process frame {}: {} synthetic nodes",
            target.url,
            synthetic_nodes.len()
        );
        nodes.extend(synthetic_nodes);
    }

    let covered: HashSet<&str> = known_urls
        .iter()
        .copied()
        .chain(oopifs.iter().map(|target| target.url.as_str()))
        .collect();
    let page_frames = match session.page_frames().await {
        Ok(page_frames) => page_frames,
        Err(e) => {
            log::debug!("Could not enumerate page frames: {}", e);
            Vec::new()
        }
    };

    for page_frame in page_frames {
        if covered.contains(page_frame.url.as_str()) {
            continue;
        }
        log::debug!("Querying frame missing from the frame tree: {}", page_frame.url);
        let synthetic_nodes =
            synthetic::frame_nodes(session, &page_frame.frame, &page_frame.url, query, &mut ids)
                .await;
        nodes.extend(synthetic_nodes);
    }

    Ok(nodes)
}

/// Collect and assemble a Chromium tree.
pub async fn build_tree<S>(session: &S, query: &SyntheticQuery) -> Result<ChromiumTree>
where
    S: ChromiumSession + ?Sized,
{
    let nodes = collect_nodes(session, query).await?;
    log::info!("Collected {} accessibility nodes", nodes.len());
    Ok(ChromiumTree::new(nodes))
}
