//! Tree building, numbering, serialization and scoping across the three platforms.

use robert_a11y::accessibility::chromium::AxValue;
use robert_a11y::accessibility::RawAxNode;
use robert_a11y::{
    A11yError, AccessibilityTree, ChromiumTree, FrameRef, Platform, UiAutomator2Tree,
    XcuiTestTree,
};
use std::borrow::Cow;

const ANDROID_SOURCE: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy index="0" class="hierarchy" rotation="0" width="1080" height="2400">
  <android.widget.FrameLayout index="0" class="android.widget.FrameLayout" bounds="[0,0][1080,2400]">
    <android.widget.Button index="0" class="android.widget.Button" text="Buy" resource-id="com.shop:id/buy" bounds="[0,0][100,50]" />
    <android.widget.TextView index="1" class="android.widget.TextView" text="Total" bounds="[0,60][100,90]" />
  </android.widget.FrameLayout>
</hierarchy>"#;

fn ax_node(
    frame: &str,
    id: &str,
    parent: Option<&str>,
    role: &str,
    name: &str,
    backend: Option<i64>,
    children: &[&str],
) -> RawAxNode {
    RawAxNode {
        node_id: id.to_string(),
        parent_id: parent.map(str::to_string),
        backend_dom_node_id: backend,
        role: Some(AxValue::string(role)),
        name: Some(AxValue::string(name)),
        child_ids: Some(children.iter().map(|c| c.to_string()).collect()),
        frame: Some(FrameRef::new(frame)),
        ..Default::default()
    }
}

/// Main document with a button and an iframe, plus the embedded frame's own tree.
fn page_with_iframe() -> ChromiumTree {
    let mut frame_root = ax_node("F1", "1", None, "RootWebArea", "", Some(200), &["2"]);
    frame_root.parent_iframe_backend_node_id = Some(102);
    frame_root.frame_chain = vec![102];
    let mut pay = ax_node("F1", "2", Some("1"), "button", "Pay", Some(201), &[]);
    pay.frame_chain = vec![102];

    ChromiumTree::new(vec![
        ax_node("main", "1", None, "RootWebArea", "Shop", Some(100), &["2", "3"]),
        ax_node("main", "2", Some("1"), "button", "Buy", Some(101), &[]),
        ax_node("main", "3", Some("1"), "Iframe", "", Some(102), &[]),
        frame_root,
        pay,
    ])
}

#[test]
fn test_ids_are_pre_order() {
    let tree = UiAutomator2Tree::new(ANDROID_SOURCE);

    let tags: Vec<String> = (1..=5)
        .map(|raw_id| {
            tree.element_by_id(raw_id)
                .unwrap()
                .element_type
                .unwrap_or_default()
        })
        .collect();
    assert_eq!(
        tags,
        vec![
            "root",
            "hierarchy",
            "android.widget.FrameLayout",
            "android.widget.Button",
            "android.widget.TextView",
        ]
    );
    assert!(matches!(tree.element_by_id(6), Err(A11yError::NotFound(6))));
}

#[test]
fn test_serialization_is_memoized_and_deterministic() {
    let tree = UiAutomator2Tree::new(ANDROID_SOURCE);
    let first = tree.to_str();
    let second = tree.to_str();

    assert!(std::ptr::eq(first, second));
    assert_eq!(first, UiAutomator2Tree::new(ANDROID_SOURCE).to_str());
}

#[test]
fn test_multiple_declarations_collapse_to_one_root() {
    let window = r#"<hierarchy rotation="0"><android.widget.FrameLayout class="android.widget.FrameLayout" /></hierarchy>"#;
    let source = format!(
        "<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>\n{0}\n<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>\n{0}\n<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>\n{0}",
        window
    );
    let tree = UiAutomator2Tree::new(&source);
    let text = tree.to_str();

    assert!(text.starts_with("<root raw_id=\"1\">\n"));
    assert!(text.ends_with("</root>\n"));
    assert_eq!(text.matches("<hierarchy").count(), 3);
    assert!(!text.contains("<?xml"));
    assert_eq!(
        tree.element_by_id(7).unwrap().element_type.as_deref(),
        Some("android.widget.FrameLayout")
    );
}

#[test]
fn test_android_element_fields() {
    let tree = UiAutomator2Tree::new(ANDROID_SOURCE);
    let button = tree.element_by_id(4).unwrap();

    assert_eq!(button.id, Some(4));
    assert_eq!(button.android_class.as_deref(), Some("android.widget.Button"));
    assert_eq!(button.android_resource_id.as_deref(), Some("com.shop:id/buy"));
    assert_eq!(button.android_text.as_deref(), Some("Buy"));
    assert_eq!(button.android_bounds.as_deref(), Some("[0,0][100,50]"));
    assert_eq!(button.android_content_desc, None);
    assert_eq!(button.backend_node_id, None);
}

#[test]
fn test_reserved_characters_survive_serialization() {
    let value = r#"Say "hi" & <wave>"#;
    let source = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><AppiumAUT><XCUIElementTypeTextField type="XCUIElementTypeTextField" name="greeting" value="{}" /></AppiumAUT>"#,
        "Say &quot;hi&quot; &amp; &lt;wave&gt;"
    );
    let tree = XcuiTestTree::new(source);

    assert!(tree
        .to_str()
        .contains(r#"value="Say &quot;hi&quot; &amp; &lt;wave&gt;""#));
    let field = tree.element_by_id(2).unwrap();
    assert_eq!(field.value.as_deref(), Some(value));
    assert_eq!(field.name.as_deref(), Some("greeting"));
    assert_eq!(field.element_type.as_deref(), Some("XCUIElementTypeTextField"));
}

#[test]
fn test_stray_closing_tag_keeps_following_elements() {
    let tree = XcuiTestTree::new(
        "</junk><AppiumAUT><XCUIElementTypeButton name='Buy'/></AppiumAUT>",
    );

    assert!(tree.to_str().starts_with("<AppiumAUT raw_id=\"1\">"));
    let button = tree.element_by_id(2).unwrap();
    assert_eq!(button.name.as_deref(), Some("Buy"));
}

#[test]
fn test_scope_to_unknown_area_returns_same_tree() {
    let tree: AccessibilityTree = UiAutomator2Tree::new(ANDROID_SOURCE).into();

    match tree.scope_to_area(999) {
        Cow::Borrowed(scoped) => assert!(std::ptr::eq(scoped, &tree)),
        Cow::Owned(_) => panic!("unknown raw_id must not build a new tree"),
    }
}

#[test]
fn test_scoped_tree_keeps_ids_and_drops_outside_nodes() {
    let tree: AccessibilityTree = UiAutomator2Tree::new(ANDROID_SOURCE).into();
    let scoped = tree.scope_to_area(3);

    assert!(scoped
        .to_str()
        .starts_with("<android.widget.FrameLayout index=\"0\""));
    assert!(scoped.to_str().contains("raw_id=\"3\""));
    assert!(!scoped.to_str().contains("<hierarchy"));

    assert_eq!(
        scoped.element_by_id(4).unwrap().android_text.as_deref(),
        Some("Buy")
    );
    assert!(matches!(scoped.element_by_id(2), Err(A11yError::NotFound(2))));
    assert!(matches!(scoped.element_by_id(1), Err(A11yError::NotFound(1))));
}

#[test]
fn test_platform_of_each_tree() {
    let android: AccessibilityTree = UiAutomator2Tree::new(ANDROID_SOURCE).into();
    let ios: AccessibilityTree = XcuiTestTree::new("<AppiumAUT />").into();
    let chromium: AccessibilityTree = ChromiumTree::new(Vec::new()).into();

    assert_eq!(android.platform(), Platform::UiAutomator2);
    assert_eq!(ios.platform(), Platform::XcuiTest);
    assert_eq!(chromium.platform(), Platform::Chromium);
    assert_eq!(chromium.to_str(), "");
}

#[test]
fn test_chromium_iframe_content_is_inlined() {
    let tree = page_with_iframe();

    let expected = "\
<RootWebArea backendDOMNodeId=\"100\" nodeId=\"1\" name=\"Shop\" raw_id=\"1\">
  <button backendDOMNodeId=\"101\" nodeId=\"2\" name=\"Buy\" raw_id=\"2\" />
  <Iframe backendDOMNodeId=\"102\" nodeId=\"3\" raw_id=\"3\">
    <RootWebArea backendDOMNodeId=\"200\" nodeId=\"1\" raw_id=\"4\">
      <button backendDOMNodeId=\"201\" nodeId=\"2\" name=\"Pay\" raw_id=\"5\" />
    </RootWebArea>
  </Iframe>
</RootWebArea>
";
    assert_eq!(tree.to_str(), expected);

    let buy = tree.element_by_id(2).unwrap();
    assert_eq!(buy.backend_node_id, Some(101));
    assert_eq!(buy.frame, Some(FrameRef::new("main")));
    assert!(buy.frame_chain.is_empty());

    let pay = tree.element_by_id(5).unwrap();
    assert_eq!(pay.backend_node_id, Some(201));
    assert_eq!(pay.name.as_deref(), Some("Pay"));
    assert_eq!(pay.element_type.as_deref(), Some("button"));
    assert_eq!(pay.frame, Some(FrameRef::new("F1")));
    assert_eq!(pay.frame_chain, vec![102]);
    assert_eq!(pay.locator_info, None);
}

#[test]
fn test_chromium_scoped_tree_keeps_frame_context() {
    let tree: AccessibilityTree = page_with_iframe().into();
    let scoped = tree.scope_to_area(3);

    assert!(scoped.to_str().starts_with("<Iframe"));
    let pay = scoped.element_by_id(5).unwrap();
    assert_eq!(pay.frame_chain, vec![102]);
    assert!(matches!(scoped.element_by_id(2), Err(A11yError::NotFound(2))));
}

#[test]
fn test_chromium_orphans_become_roots() {
    let mut stranded = ax_node("F9", "1", None, "RootWebArea", "Ad", Some(900), &[]);
    stranded.parent_iframe_backend_node_id = Some(12345);

    let tree = ChromiumTree::new(vec![
        ax_node("main", "1", None, "RootWebArea", "Shop", Some(100), &["2"]),
        ax_node("main", "2", Some("1"), "button", "Buy", Some(101), &[]),
        ax_node("main", "7", Some("404"), "link", "Lost", Some(107), &[]),
        stranded,
    ]);

    let roots: Vec<&str> = tree
        .to_str()
        .lines()
        .filter(|line| !line.starts_with(' ') && !line.starts_with("</"))
        .collect();
    assert_eq!(roots.len(), 3);
    assert!(roots[1].starts_with("<link"));
    assert!(roots[2].contains("name=\"Ad\""));

    assert_eq!(tree.element_by_id(3).unwrap().backend_node_id, Some(107));
    assert_eq!(tree.element_by_id(4).unwrap().backend_node_id, Some(900));
}

#[test]
fn test_chromium_parent_cycle_is_kept() {
    let tree = ChromiumTree::new(vec![
        ax_node("main", "1", Some("2"), "group", "Left", Some(301), &["2"]),
        ax_node("main", "2", Some("1"), "group", "Right", Some(302), &["1"]),
    ]);

    assert_eq!(tree.to_str().matches("raw_id=").count(), 2);
    assert_eq!(tree.element_by_id(1).unwrap().backend_node_id, Some(301));
    assert_eq!(tree.element_by_id(2).unwrap().backend_node_id, Some(302));
}

#[test]
fn test_chromium_node_without_backend_id_is_malformed() {
    let tree = ChromiumTree::new(vec![
        ax_node("main", "1", None, "RootWebArea", "Shop", Some(100), &["2"]),
        ax_node("main", "2", Some("1"), "generic", "", None, &[]),
    ]);

    match tree.element_by_id(2) {
        Err(A11yError::MalformedElement { raw_id, missing }) => {
            assert_eq!(raw_id, 2);
            assert_eq!(missing, "backendDOMNodeId");
        }
        other => panic!("expected MalformedElement, got {:?}", other),
    }
    assert!(matches!(tree.element_by_id(3), Err(A11yError::NotFound(3))));
}

#[test]
fn test_chromium_from_protocol_response() {
    let response = serde_json::json!({
        "nodes": [
            {
                "nodeId": "1",
                "ignored": false,
                "role": { "type": "role", "value": "RootWebArea" },
                "name": { "type": "computedString", "value": "Checkout" },
                "childIds": ["2"],
                "backendDOMNodeId": 1
            },
            {
                "nodeId": "2",
                "parentId": "1",
                "ignored": false,
                "role": { "type": "role", "value": "checkbox" },
                "name": { "type": "computedString", "value": "Gift wrap" },
                "properties": [
                    { "name": "checked", "value": { "type": "tristate", "value": "false" } },
                    { "name": "focusable", "value": { "type": "booleanOrUndefined", "value": true } },
                    { "name": "labelledby", "value": { "type": "nodeList", "relatedNodes": [] } }
                ],
                "childIds": [],
                "backendDOMNodeId": 31
            }
        ]
    });
    let tree = ChromiumTree::from_response(&response).unwrap();

    assert_eq!(
        tree.to_str(),
        "<RootWebArea backendDOMNodeId=\"1\" nodeId=\"1\" ignored=\"false\" name=\"Checkout\" raw_id=\"1\">\n  \
<checkbox backendDOMNodeId=\"31\" nodeId=\"2\" ignored=\"false\" name=\"Gift wrap\" checked=\"false\" focusable=\"true\" labelledby=\"\" raw_id=\"2\" />\n\
</RootWebArea>\n"
    );
    assert_eq!(tree.element_by_id(2).unwrap().backend_node_id, Some(31));
}
