//! Appium driver against a local fake Appium server.
//!
//! The fake keeps one session with a page source, a current context and a log of the
//! locators it was asked for. Each test runs its own server on a random port.

use robert_a11y::mobile::appium::ELEMENT_KEY;
use robert_a11y::{
    A11yError, AccessibilityDriver, AppiumClient, AppiumDriver, AppiumOptions, Platform,
    RetryPolicy,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use warp::http::StatusCode;
use warp::Filter;

const SESSION: &str = "s-1";
const WEBVIEW: &str = "WEBVIEW_com.shop";

const ANDROID_SOURCE: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy index="0" class="hierarchy" rotation="0" width="1080" height="2400">
  <android.widget.FrameLayout index="0" class="android.widget.FrameLayout" bounds="[0,0][1080,2400]">
    <android.widget.Button index="0" class="android.widget.Button" text="Buy" resource-id="com.shop:id/buy" bounds="[0,0][100,50]" />
    <android.widget.Button index="1" class="android.widget.Button" text="Gone" resource-id="com.shop:id/missing" bounds="[0,60][100,110]" />
  </android.widget.FrameLayout>
</hierarchy>"#;

const IOS_SOURCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<AppiumAUT>
  <XCUIElementTypeApplication type="XCUIElementTypeApplication" name="Shop" label="Shop">
    <XCUIElementTypeButton type="XCUIElementTypeButton" name="buy" label="Buy now" enabled="true" />
  </XCUIElementTypeApplication>
</AppiumAUT>"#;

#[derive(Debug)]
struct FakeState {
    source: String,
    context: String,
    source_fetches: usize,
    context_switches: Vec<String>,
    locators: Vec<(String, String)>,
    clicks: Vec<String>,
    actions: Vec<Value>,
    released: usize,
}

struct FakeAppium {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
}

fn ok(value: Value) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&json!({ "value": value })), StatusCode::OK)
}

fn error(
    status: StatusCode,
    code: &str,
    message: &str,
) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&json!({ "value": { "error": code, "message": message } })),
        status,
    )
}

impl FakeAppium {
    async fn start(source: &str, context: &str) -> Self {
        let state = Arc::new(Mutex::new(FakeState {
            source: source.to_string(),
            context: context.to_string(),
            source_fetches: 0,
            context_switches: Vec::new(),
            locators: Vec::new(),
            clicks: Vec::new(),
            actions: Vec::new(),
            released: 0,
        }));
        let with_state = {
            let state = state.clone();
            warp::any().map(move || state.clone())
        };

        let page_source = warp::path!("session" / String / "source")
            .and(warp::get())
            .and(with_state.clone())
            .map(|_: String, state: Arc<Mutex<FakeState>>| {
                let mut state = state.lock().unwrap();
                state.source_fetches += 1;
                ok(json!(state.source))
            });

        let get_context = warp::path!("session" / String / "context")
            .and(warp::get())
            .and(with_state.clone())
            .map(|_: String, state: Arc<Mutex<FakeState>>| {
                ok(json!(state.lock().unwrap().context))
            });

        let set_context = warp::path!("session" / String / "context")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_state.clone())
            .map(|_: String, body: Value, state: Arc<Mutex<FakeState>>| {
                let name = body["name"].as_str().unwrap_or_default().to_string();
                let mut state = state.lock().unwrap();
                state.context = name.clone();
                state.context_switches.push(name);
                ok(Value::Null)
            });

        let contexts = warp::path!("session" / String / "contexts")
            .and(warp::get())
            .map(|_: String| ok(json!(["NATIVE_APP", WEBVIEW])));

        let find = warp::path!("session" / String / "element")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_state.clone())
            .map(|_: String, body: Value, state: Arc<Mutex<FakeState>>| {
                let using = body["using"].as_str().unwrap_or_default().to_string();
                let value = body["value"].as_str().unwrap_or_default().to_string();
                let missing = value.contains("missing");
                let mut state = state.lock().unwrap();
                state.locators.push((using, value));
                if missing {
                    error(
                        StatusCode::NOT_FOUND,
                        "no such element",
                        "An element could not be located on the page",
                    )
                } else {
                    ok(json!({ ELEMENT_KEY: format!("el-{}", state.locators.len()) }))
                }
            });

        let click = warp::path!("session" / String / "element" / String / "click")
            .and(warp::post())
            .and(with_state.clone())
            .map(|_: String, element: String, state: Arc<Mutex<FakeState>>| {
                state.lock().unwrap().clicks.push(element);
                ok(Value::Null)
            });

        let perform_actions = warp::path!("session" / String / "actions")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_state.clone())
            .map(|_: String, body: Value, state: Arc<Mutex<FakeState>>| {
                state.lock().unwrap().actions.push(body);
                ok(Value::Null)
            });

        let release_actions = warp::path!("session" / String / "actions")
            .and(warp::delete())
            .and(with_state.clone())
            .map(|_: String, state: Arc<Mutex<FakeState>>| {
                state.lock().unwrap().released += 1;
                ok(Value::Null)
            });

        let title = warp::path!("session" / String / "title")
            .and(warp::get())
            .and(with_state.clone())
            .map(|_: String, state: Arc<Mutex<FakeState>>| {
                if state.lock().unwrap().context == WEBVIEW {
                    ok(json!("Shop"))
                } else {
                    error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "unknown method",
                        "Method is not implemented",
                    )
                }
            });

        let url = warp::path!("session" / String / "url").and(warp::get()).map(|_: String| {
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "unknown error",
                "No web view is active",
            )
        });

        let screenshot = warp::path!("session" / String / "screenshot")
            .and(warp::get())
            .map(|_: String| ok(json!("iVBORw0KGgo=")));

        let routes = page_source
            .or(get_context)
            .or(set_context)
            .or(contexts)
            .or(find)
            .or(click)
            .or(perform_actions)
            .or(release_actions)
            .or(title)
            .or(url)
            .or(screenshot);

        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self { addr, state }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn driver(&self, platform_name: &str, options: AppiumOptions) -> AppiumDriver {
        let client = AppiumClient::attach(
            &self.url(),
            SESSION,
            json!({ "platformName": platform_name }),
        );
        AppiumDriver::new(client, options).with_retry(RetryPolicy::none())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn test_android_tree_is_read_in_native_context() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(ANDROID_SOURCE, WEBVIEW).await;
    let driver = server.driver("Android", AppiumOptions::default());

    assert_eq!(driver.platform(), Platform::UiAutomator2);
    let tree = driver.accessibility_tree().await?;

    assert_eq!(tree.platform(), Platform::UiAutomator2);
    assert!(tree.to_str().starts_with("<root raw_id=\"1\">"));
    assert!(tree.to_str().contains("resource-id=\"com.shop:id/buy\""));
    assert_eq!(server.state().context_switches, vec!["NATIVE_APP"]);
    assert_eq!(server.state().source_fetches, 1);
    Ok(())
}

#[tokio::test]
async fn test_android_element_is_found_by_xpath() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(ANDROID_SOURCE, "NATIVE_APP").await;
    let driver = server.driver("Android", AppiumOptions::default());

    // No tree requested yet: find_element builds one
    let element = driver.find_element(4).await?;
    assert_eq!(element.id, "el-1");

    let locators = server.state().locators.clone();
    assert_eq!(
        locators,
        vec![(
            "xpath".to_string(),
            r#"//android.widget.Button[@resource-id="com.shop:id/buy" and @text="Buy" and @bounds="[0,0][100,50]"]"#
                .to_string()
        )]
    );
    assert!(server.state().context_switches.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_click_sends_element_id() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(ANDROID_SOURCE, "NATIVE_APP").await;
    let driver = server.driver("Android", AppiumOptions::default());

    driver.accessibility_tree().await?;
    driver.click(4).await?;
    assert_eq!(server.state().clicks, vec!["el-1"]);
    Ok(())
}

#[tokio::test]
async fn test_drag_and_drop_moves_a_touch_pointer_between_elements() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(IOS_SOURCE, WEBVIEW).await;
    let driver = server.driver("iOS", AppiumOptions::default());

    driver.drag_and_drop(3, 2).await?;

    let state = server.state();
    assert_eq!(state.context_switches, vec!["NATIVE_APP"]);
    assert_eq!(state.locators.len(), 2);
    assert_eq!(state.actions.len(), 1);
    assert_eq!(state.released, 1);

    let pointer = &state.actions[0]["actions"][0];
    assert_eq!(pointer["parameters"]["pointerType"], "touch");
    let steps: Vec<&str> = pointer["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|step| step["type"].as_str().unwrap())
        .collect();
    assert_eq!(
        steps,
        vec!["pointerMove", "pointerDown", "pause", "pointerMove", "pointerUp"]
    );
    assert_eq!(pointer["actions"][0]["origin"][ELEMENT_KEY], "el-1");
    assert_eq!(pointer["actions"][3]["origin"][ELEMENT_KEY], "el-2");
    Ok(())
}

#[tokio::test]
async fn test_native_no_such_element_propagates() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(ANDROID_SOURCE, "NATIVE_APP").await;
    let driver = server.driver("Android", AppiumOptions::default());

    driver.accessibility_tree().await?;
    match driver.find_element(5).await {
        Err(A11yError::WebDriver(e)) => assert!(e.is_no_such_element()),
        other => panic!("expected a WebDriver error, got {:?}", other.map(|e| e.id)),
    }
    Ok(())
}

#[tokio::test]
async fn test_unknown_raw_id_is_not_found() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(ANDROID_SOURCE, "NATIVE_APP").await;
    let driver = server.driver("Android", AppiumOptions::default());

    driver.accessibility_tree().await?;
    assert!(matches!(
        driver.find_element(42).await,
        Err(A11yError::NotFound(42))
    ));
    assert!(server.state().locators.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_ios_element_is_found_by_predicate() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(IOS_SOURCE, "NATIVE_APP").await;
    let driver = server.driver("iOS", AppiumOptions::default());

    assert_eq!(driver.platform(), Platform::XcuiTest);
    let tree = driver.accessibility_tree().await?;
    assert_eq!(
        tree.element_by_id(3)?.element_type.as_deref(),
        Some("XCUIElementTypeButton")
    );

    driver.find_element(3).await?;
    let locators = server.state().locators.clone();
    assert_eq!(
        locators,
        vec![(
            "-ios predicate string".to_string(),
            r#"type == "XCUIElementTypeButton" AND name == "buy" AND label == "Buy now""#
                .to_string()
        )]
    );
    Ok(())
}

#[tokio::test]
async fn test_title_switches_to_webview_and_url_falls_back_to_empty() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(ANDROID_SOURCE, "NATIVE_APP").await;
    let driver = server.driver("Android", AppiumOptions::default());

    assert_eq!(driver.title().await?, "Shop");
    assert_eq!(server.state().context_switches, vec![WEBVIEW]);
    assert_eq!(driver.url().await?, "");

    driver.accessibility_tree().await?;
    assert_eq!(server.state().context_switches, vec![WEBVIEW, "NATIVE_APP"]);
    Ok(())
}

#[tokio::test]
async fn test_context_switching_can_be_disabled() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(ANDROID_SOURCE, WEBVIEW).await;
    let options = AppiumOptions {
        autoswitch_contexts: false,
        ..Default::default()
    };
    let driver = server.driver("Android", options);

    driver.accessibility_tree().await?;
    assert_eq!(driver.title().await?, "Shop");
    assert!(server.state().context_switches.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_double_fetch_reads_source_twice() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(ANDROID_SOURCE, "NATIVE_APP").await;
    let options = AppiumOptions {
        double_fetch_page_source: true,
        ..Default::default()
    };
    let driver = server.driver("Android", options);

    driver.accessibility_tree().await?;
    assert_eq!(server.state().source_fetches, 2);
    Ok(())
}

#[tokio::test]
async fn test_screenshot_is_decoded() -> anyhow::Result<()> {
    init_logging();
    let server = FakeAppium::start(ANDROID_SOURCE, "NATIVE_APP").await;
    let driver = server.driver("Android", AppiumOptions::default());

    let png = driver.screenshot().await?;
    assert_eq!(&png[..4], b"\x89PNG");
    Ok(())
}
