use super::session::ChromiumSession;
use crate::accessibility::{AccessibilityElement, LocatorInfo};
use crate::error::{A11yError, Result};

/// Temporary attribute used to find a pushed node with a CSS query.
pub const ELEMENT_MARKER: &str = "data-robert-id";
/// Same, for the `<iframe>` elements of a frame chain.
pub const IFRAME_MARKER: &str = "data-robert-iframe-id";

/// Turn an element of the current tree into a live handle.
///
/// Protocol nodes are reached by entering every iframe of their frame chain from the top
/// document, then marking the node and querying for the mark. The mark is removed again
/// whether or not the query found it. Errors from the final query come back unchanged.
pub async fn resolve<S>(session: &S, element: &AccessibilityElement) -> Result<S::Element>
where
    S: ChromiumSession + ?Sized,
{
    if let Some(locator) = &element.locator_info {
        return resolve_synthetic(session, element, locator).await;
    }

    let backend_node_id = element
        .backend_node_id
        .ok_or_else(|| A11yError::MalformedElement {
            raw_id: element.id.unwrap_or_default(),
            missing: "backendDOMNodeId".to_string(),
        })?;

    session.switch_to_default_content().await?;
    for &iframe in &element.frame_chain {
        enter_iframe(session, iframe).await?;
    }

    locate_marked(session, backend_node_id, ELEMENT_MARKER).await
}

async fn enter_iframe<S>(session: &S, backend_node_id: i64) -> Result<()>
where
    S: ChromiumSession + ?Sized,
{
    log::debug!("Switching into iframe backendNodeId={}", backend_node_id);
    let frame_switch = |e: A11yError| A11yError::FrameSwitch {
        backend_node_id,
        reason: e.to_string(),
    };

    let iframe = locate_marked(session, backend_node_id, IFRAME_MARKER)
        .await
        .map_err(frame_switch)?;
    session.switch_to_frame(&iframe).await.map_err(frame_switch)
}

async fn locate_marked<S>(session: &S, backend_node_id: i64, marker: &str) -> Result<S::Element>
where
    S: ChromiumSession + ?Sized,
{
    let node_id = session.push_backend_node(backend_node_id).await?;
    let value = backend_node_id.to_string();
    session.set_attribute(node_id, marker, &value).await?;

    let found = session
        .find_css(&format!("[{}='{}']", marker, value))
        .await;

    if let Err(e) = session.remove_attribute(node_id, marker).await {
        log::warn!("Failed to remove {} from node {}: {}", marker, node_id, e);
    }

    found
}

async fn resolve_synthetic<S>(
    session: &S,
    element: &AccessibilityElement,
    locator: &LocatorInfo,
) -> Result<S::Element>
where
    S: ChromiumSession + ?Sized,
{
    let raw_id = element.id.unwrap_or_default();
    let frame = element
        .frame
        .as_ref()
        .ok_or_else(|| A11yError::MalformedElement {
            raw_id,
            missing: "frame".to_string(),
        })?;

    match locator {
        LocatorInfo::SyntheticFrame { frame_url } => {
            log::debug!("Resolving frame node for {} to its body", frame_url);
            session.frame_body(frame).await
        }
        LocatorInfo::Nth { selector, nth } => {
            log::debug!("Finding element by selector {} (nth={})", selector, nth);
            session.find_nth(frame, selector, *nth).await
        }
        LocatorInfo::Role { role: None, name: None } => Err(A11yError::MalformedElement {
            raw_id,
            missing: "role or name".to_string(),
        }),
        LocatorInfo::Role { role, name } => {
            log::debug!("Finding element by role={:?} name={:?}", role, name);
            session
                .find_by_role(frame, role.as_deref(), name.as_deref())
                .await
        }
    }
}
