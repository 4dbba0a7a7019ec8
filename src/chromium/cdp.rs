// spider_chrome re-exports the chromiumoxide API
use super::session::{ChromiumSession, FrameTreeInfo, PageFrame, QueriedElement, TargetInfo};
use crate::accessibility::{FrameRef, RawAxNode};
use crate::error::{A11yError, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::accessibility::{GetFullAxTreeParams, QueryAxTreeParams};
use chromiumoxide::cdp::browser_protocol::dom::{
    BackendNodeId, DescribeNodeParams, EnableParams as DomEnableParams, FocusParams,
    GetBoxModelParams, GetDocumentParams, GetFrameOwnerParams, Node, NodeId,
    PushNodesByBackendIdsToFrontendParams, QuerySelectorParams, RemoveAttributeParams,
    RequestNodeParams, ResolveNodeParams, ScrollIntoViewIfNeededParams, SetAttributeValueParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CreateIsolatedWorldParams, FrameId, FrameTree, GetFrameTreeParams,
};
use chromiumoxide::cdp::browser_protocol::target::GetTargetsParams;
use chromiumoxide::cdp::js_protocol::runtime::{
    CallArgument, CallFunctionOnParams, EvaluateParams, ExecutionContextId, RemoteObject,
};
use chromiumoxide::page::Page;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

const ISOLATED_WORLD: &str = "robert-a11y";

/// Picks an option of the `<select>` the receiver is, or belongs to. A `null` option
/// means the receiver itself is the `<option>` to pick.
const SELECT_OPTION: &str = r#"function(option) {
    const select = this.tagName === 'OPTION' ? this.closest('select') : this;
    if (!select || select.tagName !== 'SELECT') {
        throw new Error('not a <select> or <option>: ' + this.tagName);
    }
    const picked = option === null
        ? this
        : Array.from(select.options).find(o => o.text.trim() === option || o.value === option);
    if (!picked) {
        throw new Error('no option ' + JSON.stringify(option));
    }
    picked.selected = true;
    select.dispatchEvent(new Event('input', { bubbles: true }));
    select.dispatchEvent(new Event('change', { bubbles: true }));
    return picked.value;
}"#;

/// A DOM node addressed by its protocol node id.
///
/// Node ids belong to the protocol session that issued them and stay valid only until
/// that session fetches its document again, which every resolution does. Act on a
/// handle before resolving the next one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CdpElement {
    pub node_id: i64,
    /// Cross-process frame whose session issued `node_id`; `None` for the page itself
    pub target: Option<FrameRef>,
}

impl CdpElement {
    fn in_page(node_id: i64) -> Self {
        Self {
            node_id,
            target: None,
        }
    }
}

#[derive(Default)]
struct DomState {
    /// Full document, pierced through same-process iframes
    document: Option<Node>,
    /// Document node queries run against; `None` means the top document
    current_root: Option<i64>,
}

/// One `Input.dispatchMouseEvent` call, in page coordinates.
#[derive(Debug, Clone, PartialEq)]
struct MouseStep {
    kind: DispatchMouseEventType,
    x: f64,
    y: f64,
    /// Left button held down
    held: bool,
}

impl MouseStep {
    fn new(kind: DispatchMouseEventType, (x, y): (f64, f64), held: bool) -> Self {
        Self { kind, x, y, held }
    }
}

fn click_steps(at: (f64, f64)) -> Vec<MouseStep> {
    vec![
        MouseStep::new(DispatchMouseEventType::MouseMoved, at, false),
        MouseStep::new(DispatchMouseEventType::MousePressed, at, true),
        MouseStep::new(DispatchMouseEventType::MouseReleased, at, false),
    ]
}

/// Press on `from`, move to `to` in two steps with the button held, release there.
fn drag_steps(from: (f64, f64), to: (f64, f64)) -> Vec<MouseStep> {
    let midway = ((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0);
    vec![
        MouseStep::new(DispatchMouseEventType::MouseMoved, from, false),
        MouseStep::new(DispatchMouseEventType::MousePressed, from, true),
        MouseStep::new(DispatchMouseEventType::MouseMoved, midway, true),
        MouseStep::new(DispatchMouseEventType::MouseMoved, to, true),
        MouseStep::new(DispatchMouseEventType::MouseReleased, to, false),
    ]
}

/// `ChromiumSession` over one chromiumoxide page.
///
/// Frames rendered in another process are reached through the pages registered with
/// [`set_frame_targets`](Self::set_frame_targets); everything else runs on the page.
pub struct CdpSession {
    page: Page,
    dom: Mutex<DomState>,
    frame_targets: Mutex<HashMap<FrameRef, Page>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueriedElementJson {
    #[serde(default)]
    text: String,
    #[serde(default)]
    aria_label: Option<String>,
}

impl CdpSession {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            dom: Mutex::new(DomState::default()),
            frame_targets: Mutex::new(HashMap::new()),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Replace the sessions of cross-process iframes, keyed by target id.
    pub async fn set_frame_targets(&self, targets: HashMap<FrameRef, Page>) {
        log::debug!("Attached {} cross-process frame sessions", targets.len());
        *self.frame_targets.lock().await = targets;
    }

    /// Session that owns `frame`, if it runs in another process.
    async fn frame_target(&self, frame: &FrameRef) -> Option<Page> {
        self.frame_targets.lock().await.get(frame).cloned()
    }

    async fn element_page(&self, element: &CdpElement) -> Page {
        match &element.target {
            Some(frame) => self
                .frame_target(frame)
                .await
                .unwrap_or_else(|| self.page.clone()),
            None => self.page.clone(),
        }
    }

    /// Fetch the document again. This discards every node id issued before.
    async fn refresh_document(&self, state: &mut DomState) -> Result<i64> {
        self.page.execute(DomEnableParams::default()).await?;
        let response = self
            .page
            .execute(GetDocumentParams::builder().depth(-1).pierce(true).build())
            .await?;
        let root = response.result.root.clone();
        let root_id = *root.node_id.inner();
        state.document = Some(root);
        Ok(root_id)
    }

    async fn current_root(&self) -> Result<i64> {
        let mut state = self.dom.lock().await;
        if let Some(root) = state.current_root {
            return Ok(root);
        }
        if let Some(document) = &state.document {
            return Ok(*document.node_id.inner());
        }
        self.refresh_document(&mut state).await
    }

    /// Make sure the DOM domain of a frame target can hand out node ids.
    async fn prepare_target(&self, target: &Page) -> Result<()> {
        target.execute(DomEnableParams::default()).await?;
        target
            .execute(GetDocumentParams::builder().depth(0).build())
            .await?;
        Ok(())
    }

    async fn evaluate_in_frame(
        &self,
        frame: &FrameRef,
        expression: String,
        return_by_value: bool,
    ) -> Result<RemoteObject> {
        let page = self
            .frame_target(frame)
            .await
            .unwrap_or_else(|| self.page.clone());
        let context = isolated_world(&page, frame).await?;
        let params = EvaluateParams::builder()
            .expression(expression)
            .context_id(context)
            .return_by_value(return_by_value)
            .build()
            .map_err(A11yError::Other)?;
        let response = page.execute(params).await?;

        if let Some(exception) = &response.result.exception_details {
            return Err(A11yError::Other(format!(
                "Script failed in frame {}: {}",
                frame, exception.text
            )));
        }
        Ok(response.result.result.clone())
    }

    /// Evaluate an expression that yields a DOM node and hand it to the DOM domain.
    async fn element_from_expression(
        &self,
        frame: &FrameRef,
        expression: String,
        description: &str,
    ) -> Result<CdpElement> {
        let target = self.frame_target(frame).await;
        match &target {
            Some(target) => self.prepare_target(target).await?,
            None => {
                let mut state = self.dom.lock().await;
                if state.document.is_none() {
                    self.refresh_document(&mut state).await?;
                }
            }
        }

        let object = self.evaluate_in_frame(frame, expression, false).await?;
        let object_id = object
            .object_id
            .ok_or_else(|| A11yError::NoSuchElement(description.to_string()))?;
        let page = target.as_ref().unwrap_or(&self.page);
        let response = page.execute(RequestNodeParams::new(object_id)).await?;
        Ok(CdpElement {
            node_id: *response.result.node_id.inner(),
            target: target.map(|_| frame.clone()),
        })
    }

    /// Center of the element's content box in page coordinates, after scrolling it
    /// into view.
    pub async fn center_of(&self, element: &CdpElement) -> Result<(f64, f64)> {
        let page = self.element_page(element).await;
        let node_id = NodeId::new(element.node_id);
        page.execute(
            ScrollIntoViewIfNeededParams::builder()
                .node_id(node_id.clone())
                .build(),
        )
        .await?;
        let response = page
            .execute(GetBoxModelParams::builder().node_id(node_id).build())
            .await?;
        let (x, y) = quad_center(response.result.model.content.inner(), element.node_id)?;

        // Frame targets report coordinates relative to their own viewport
        match &element.target {
            Some(frame) => {
                let (left, top) = self.frame_origin(frame).await?;
                Ok((x + left, y + top))
            }
            None => Ok((x, y)),
        }
    }

    /// Top-left corner of the content box of the `<iframe>` showing `frame`.
    async fn frame_origin(&self, frame: &FrameRef) -> Result<(f64, f64)> {
        let owner = self.frame_owner(frame).await?;
        let response = self
            .page
            .execute(
                GetBoxModelParams::builder()
                    .backend_node_id(BackendNodeId::new(owner))
                    .build(),
            )
            .await?;
        let quad = response.result.model.content.inner();
        match (quad.first(), quad.get(1)) {
            (Some(&left), Some(&top)) => Ok((left, top)),
            _ => Err(A11yError::Other(format!(
                "Iframe of frame {} has no content box",
                frame
            ))),
        }
    }

    async fn dispatch_mouse(&self, steps: Vec<MouseStep>) -> Result<()> {
        for step in steps {
            let mut builder = DispatchMouseEventParams::builder()
                .r#type(step.kind.clone())
                .x(step.x)
                .y(step.y);
            if step.kind != DispatchMouseEventType::MouseMoved {
                builder = builder.button(MouseButton::Left).click_count(1);
            } else if step.held {
                builder = builder.button(MouseButton::Left);
            }
            if step.held {
                builder = builder.buttons(1);
            }
            let params = builder.build().map_err(A11yError::Other)?;
            self.page.execute(params).await?;
        }
        Ok(())
    }

    pub async fn click(&self, element: &CdpElement) -> Result<()> {
        let at = self.center_of(element).await?;
        log::debug!("Clicking node {} at {:?}", element.node_id, at);
        self.dispatch_mouse(click_steps(at)).await
    }

    pub async fn hover(&self, element: &CdpElement) -> Result<()> {
        let at = self.center_of(element).await?;
        self.dispatch_mouse(vec![MouseStep::new(
            DispatchMouseEventType::MouseMoved,
            at,
            false,
        )])
        .await
    }

    /// Drag with the left button between two page points from [`center_of`](Self::center_of).
    pub async fn drag(&self, start: (f64, f64), end: (f64, f64)) -> Result<()> {
        log::debug!("Dragging from {:?} to {:?}", start, end);
        self.dispatch_mouse(drag_steps(start, end)).await
    }

    pub async fn type_text(&self, element: &CdpElement, text: &str) -> Result<()> {
        self.element_page(element)
            .await
            .execute(
                FocusParams::builder()
                    .node_id(NodeId::new(element.node_id))
                    .build(),
            )
            .await?;
        self.page.execute(InsertTextParams::new(text)).await?;
        Ok(())
    }

    /// Lower-case tag name, `option` for an `<option>` element.
    pub async fn tag_name(&self, element: &CdpElement) -> Result<String> {
        let response = self
            .element_page(element)
            .await
            .execute(
                DescribeNodeParams::builder()
                    .node_id(NodeId::new(element.node_id))
                    .build(),
            )
            .await?;
        Ok(response.result.node.node_name.to_ascii_lowercase())
    }

    /// Pick `option` (by text or value) in the `<select>` that `element` is or belongs
    /// to. Without an option, `element` must be the `<option>` to pick. Returns the
    /// value of the picked option.
    pub async fn select_option(
        &self,
        element: &CdpElement,
        option: Option<&str>,
    ) -> Result<String> {
        let page = self.element_page(element).await;
        let resolved = page
            .execute(
                ResolveNodeParams::builder()
                    .node_id(NodeId::new(element.node_id))
                    .build(),
            )
            .await?;
        let object_id = resolved.result.object.object_id.clone().ok_or_else(|| {
            A11yError::NoSuchElement(format!("node {} has no script object", element.node_id))
        })?;

        let argument = CallArgument::builder()
            .value(option.map_or(Value::Null, |option| Value::String(option.to_string())))
            .build();
        let params = CallFunctionOnParams::builder()
            .function_declaration(SELECT_OPTION)
            .object_id(object_id)
            .argument(argument)
            .return_by_value(true)
            .build()
            .map_err(A11yError::Other)?;
        let response = page.execute(params).await?;

        if let Some(exception) = &response.result.exception_details {
            let description = exception
                .exception
                .as_ref()
                .and_then(|e| e.description.clone())
                .unwrap_or_else(|| exception.text.clone());
            return Err(A11yError::Other(format!("Select failed: {}", description)));
        }
        let value = match &response.result.result.value {
            Some(Value::String(value)) => value.clone(),
            _ => String::new(),
        };
        log::debug!("Selected option {:?} on node {}", value, element.node_id);
        Ok(value)
    }

    async fn push_backend_node_on(&self, page: &Page, backend_node_id: i64) -> Result<i64> {
        let response = page
            .execute(PushNodesByBackendIdsToFrontendParams::new(vec![
                BackendNodeId::new(backend_node_id),
            ]))
            .await?;
        response
            .result
            .node_ids
            .first()
            .map(|node_id| *node_id.inner())
            .filter(|node_id| *node_id != 0)
            .ok_or_else(|| A11yError::NoSuchElement(format!("backendNodeId={}", backend_node_id)))
    }
}

async fn isolated_world(page: &Page, frame: &FrameRef) -> Result<ExecutionContextId> {
    let params = CreateIsolatedWorldParams::builder()
        .frame_id(FrameId::new(frame.as_str()))
        .world_name(ISOLATED_WORLD)
        .build()
        .map_err(A11yError::Other)?;
    let response = page.execute(params).await?;
    Ok(response.result.execution_context_id)
}

fn quad_center(quad: &[f64], node_id: i64) -> Result<(f64, f64)> {
    if quad.len() < 8 {
        return Err(A11yError::Other(format!("Node {} has no content box", node_id)));
    }
    let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
    let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;
    Ok((x, y))
}

fn frame_tree_info(tree: &FrameTree) -> FrameTreeInfo {
    let children = tree
        .child_frames
        .iter()
        .flatten()
        .map(frame_tree_info)
        .collect();
    FrameTreeInfo::new(tree.frame.id.inner().as_str(), tree.frame.url.as_str())
        .with_children(children)
}

/// Depth-first over children, shadow roots and iframe documents.
fn walk_document<'a>(root: &'a Node, mut visit: impl FnMut(&'a Node) -> bool) -> Option<&'a Node> {
    let mut pending = vec![root];
    while let Some(node) = pending.pop() {
        if visit(node) {
            return Some(node);
        }
        if let Some(document) = &node.content_document {
            pending.push(document.as_ref());
        }
        pending.extend(node.shadow_roots.iter().flatten());
        pending.extend(node.children.iter().flatten().rev());
    }
    None
}

fn attribute<'a>(node: &'a Node, name: &str) -> Option<&'a str> {
    node.attributes
        .as_ref()?
        .chunks(2)
        .find(|pair| pair.first().map(String::as_str) == Some(name))
        .and_then(|pair| pair.get(1))
        .map(String::as_str)
}

/// JavaScript string literal for `value`.
fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

#[async_trait]
impl ChromiumSession for CdpSession {
    type Element = CdpElement;

    async fn frame_tree(&self) -> Result<FrameTreeInfo> {
        let response = self.page.execute(GetFrameTreeParams::default()).await?;
        Ok(frame_tree_info(&response.result.frame_tree))
    }

    async fn frame_owner(&self, frame: &FrameRef) -> Result<i64> {
        self.page.execute(DomEnableParams::default()).await?;
        let response = self
            .page
            .execute(GetFrameOwnerParams::new(FrameId::new(frame.as_str())))
            .await?;
        Ok(*response.result.backend_node_id.inner())
    }

    async fn full_ax_tree(&self, frame: &FrameRef) -> Result<Vec<RawAxNode>> {
        let response = self
            .page
            .execute(
                GetFullAxTreeParams::builder()
                    .frame_id(FrameId::new(frame.as_str()))
                    .build(),
            )
            .await?;
        let nodes = serde_json::to_value(&response.result.nodes)?;
        Ok(serde_json::from_value(nodes)?)
    }

    async fn targets(&self) -> Result<Vec<TargetInfo>> {
        let response = self.page.execute(GetTargetsParams::default()).await?;
        Ok(response
            .result
            .target_infos
            .iter()
            .map(|target| TargetInfo {
                target_id: target.target_id.inner().clone(),
                target_type: target.r#type.clone(),
                url: target.url.clone(),
            })
            .collect())
    }

    async fn page_frames(&self) -> Result<Vec<PageFrame>> {
        let mut state = self.dom.lock().await;
        self.refresh_document(&mut state).await?;
        let Some(document) = &state.document else {
            return Ok(Vec::new());
        };

        let mut frames = Vec::new();
        walk_document(document, |node| {
            if let (Some(frame_id), Some(content)) = (&node.frame_id, &node.content_document) {
                let url = content
                    .document_url
                    .clone()
                    .or_else(|| attribute(node, "src").map(str::to_string))
                    .unwrap_or_default();
                frames.push(PageFrame {
                    frame: FrameRef::new(frame_id.inner().as_str()),
                    url,
                });
            }
            false
        });
        Ok(frames)
    }

    async fn iframe_backend_node_id_by_url(&self, url: &str) -> Result<Option<i64>> {
        let mut state = self.dom.lock().await;
        if state.document.is_none() {
            self.refresh_document(&mut state).await?;
        }
        let Some(document) = &state.document else {
            return Ok(None);
        };

        let iframe = walk_document(document, |node| {
            node.node_name.eq_ignore_ascii_case("iframe") && attribute(node, "src") == Some(url)
        });
        Ok(iframe.map(|node| *node.backend_node_id.inner()))
    }

    async fn query_elements(
        &self,
        frame: &FrameRef,
        selector: &str,
        limit: usize,
    ) -> Result<Vec<QueriedElement>> {
        let expression = format!(
            "Array.from(document.querySelectorAll({})).slice(0, {}).map(e => ({{ \
             text: e.textContent || '', ariaLabel: e.getAttribute('aria-label') }}))",
            js_string(selector),
            limit
        );
        let object = self.evaluate_in_frame(frame, expression, true).await?;
        let elements: Vec<QueriedElementJson> = match object.value {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        Ok(elements
            .into_iter()
            .map(|element| QueriedElement {
                text: element.text,
                aria_label: element.aria_label,
            })
            .collect())
    }

    async fn push_backend_node(&self, backend_node_id: i64) -> Result<i64> {
        self.push_backend_node_on(&self.page, backend_node_id).await
    }

    async fn set_attribute(&self, node_id: i64, name: &str, value: &str) -> Result<()> {
        self.page
            .execute(SetAttributeValueParams::new(NodeId::new(node_id), name, value))
            .await?;
        Ok(())
    }

    async fn remove_attribute(&self, node_id: i64, name: &str) -> Result<()> {
        self.page
            .execute(RemoveAttributeParams::new(NodeId::new(node_id), name))
            .await?;
        Ok(())
    }

    async fn switch_to_default_content(&self) -> Result<()> {
        let mut state = self.dom.lock().await;
        self.refresh_document(&mut state).await?;
        state.current_root = None;
        Ok(())
    }

    async fn switch_to_frame(&self, iframe: &CdpElement) -> Result<()> {
        let mut state = self.dom.lock().await;
        let content_document = |document: &Node| {
            walk_document(document, |node| *node.node_id.inner() == iframe.node_id)
                .and_then(|node| node.content_document.as_ref())
                .map(|content| *content.node_id.inner())
        };

        let mut found = state.document.as_ref().and_then(content_document);
        if found.is_none() {
            self.refresh_document(&mut state).await?;
            found = state.document.as_ref().and_then(content_document);
        }

        let root = found.ok_or_else(|| {
            A11yError::Other(format!(
                "Node {} has no same-process content document",
                iframe.node_id
            ))
        })?;
        state.current_root = Some(root);
        Ok(())
    }

    async fn find_css(&self, selector: &str) -> Result<CdpElement> {
        let root = self.current_root().await?;
        let response = self
            .page
            .execute(QuerySelectorParams::new(NodeId::new(root), selector))
            .await?;
        match *response.result.node_id.inner() {
            0 => Err(A11yError::NoSuchElement(selector.to_string())),
            node_id => Ok(CdpElement::in_page(node_id)),
        }
    }

    async fn find_nth(&self, frame: &FrameRef, selector: &str, nth: usize) -> Result<CdpElement> {
        let expression = format!(
            "document.querySelectorAll({})[{}] || null",
            js_string(selector),
            nth
        );
        self.element_from_expression(frame, expression, &format!("{} (nth={})", selector, nth))
            .await
    }

    async fn find_by_role(
        &self,
        frame: &FrameRef,
        role: Option<&str>,
        name: Option<&str>,
    ) -> Result<CdpElement> {
        let document = self
            .evaluate_in_frame(frame, "document".to_string(), false)
            .await?;
        let object_id = document
            .object_id
            .ok_or_else(|| A11yError::Other(format!("Frame {} has no document", frame)))?;

        let mut params = QueryAxTreeParams::builder().object_id(object_id);
        if let Some(role) = role {
            params = params.role(role);
        }
        if let Some(name) = name {
            params = params.accessible_name(name);
        }
        let target = self.frame_target(frame).await;
        let page = target.as_ref().unwrap_or(&self.page);
        let response = page.execute(params.build()).await?;

        let backend_node_id = response
            .result
            .nodes
            .iter()
            .filter(|node| !node.ignored)
            .find_map(|node| node.backend_dom_node_id.as_ref())
            .map(|id| *id.inner())
            .ok_or_else(|| {
                A11yError::NoSuchElement(format!("role={:?} name={:?}", role, name))
            })?;

        match &target {
            Some(target) => self.prepare_target(target).await?,
            None => {
                let mut state = self.dom.lock().await;
                if state.document.is_none() {
                    self.refresh_document(&mut state).await?;
                }
            }
        }
        let node_id = self.push_backend_node_on(page, backend_node_id).await?;
        Ok(CdpElement {
            node_id,
            target: target.as_ref().map(|_| frame.clone()),
        })
    }

    async fn frame_body(&self, frame: &FrameRef) -> Result<CdpElement> {
        self.element_from_expression(frame, "document.body".to_string(), "body")
            .await
    }
}
