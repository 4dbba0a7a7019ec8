//! End-to-end checks against a real headless Chrome.
//!
//! Uses the local test server so no network access is needed. Run with
//! `cargo test -- --ignored` on a machine with Chrome installed.


use robert_a11y::{AccessibilityDriver, AccessibilityElement, ChromeDriver, ConnectionMode};
use test_server::TestServer;

async fn create_headless_driver() -> anyhow::Result<ChromeDriver> {
    ChromeDriver::new(ConnectionMode::Sandboxed {
        chrome_path: None,
        no_sandbox: true, // Required for CI environments
        headless: true,
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to launch Chrome: {}", e))
}

/// Every element of the last tree with this role and name, in document order.
async fn elements_named(
    driver: &ChromeDriver,
    role: &str,
    name: &str,
) -> anyhow::Result<Vec<AccessibilityElement>> {
    let tree = driver.accessibility_tree().await?;
    let count = tree.to_str().matches("raw_id=").count() as u32;
    Ok((1..=count)
        .filter_map(|raw_id| tree.element_by_id(raw_id).ok())
        .filter(|e| e.element_type.as_deref() == Some(role) && e.name.as_deref() == Some(name))
        .collect())
}

async fn wait_for_title(driver: &ChromeDriver, expected: &str) -> anyhow::Result<()> {
    for _ in 0..20 {
        if driver.title().await? == expected {
            return Ok(());
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
    anyhow::bail!("Title never became {:?}", expected)
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
#[ignore = "requires a Chrome binary"]
async fn test_tree_includes_iframe_content() -> anyhow::Result<()> {
    init_logging();
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;

    driver.navigate(&server.url()).await?;
    let tree = driver.accessibility_tree().await?;
    println!("{}", tree.to_str());

    assert!(tree.to_str().starts_with("<RootWebArea"));
    assert!(tree.to_str().contains("name=\"Email\""));

    let buttons = elements_named(&driver, "button", "Buy").await?;
    assert_eq!(buttons.len(), 2, "one Buy button per frame");
    assert!(buttons[0].frame_chain.is_empty());
    assert_eq!(buttons[1].frame_chain.len(), 1);
    assert_ne!(buttons[0].frame, buttons[1].frame);

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome binary"]
async fn test_click_reaches_button_inside_iframe() -> anyhow::Result<()> {
    init_logging();
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;

    driver.navigate(&server.url()).await?;
    let buttons = elements_named(&driver, "button", "Buy").await?;
    let framed = buttons
        .iter()
        .find(|b| !b.frame_chain.is_empty())
        .and_then(|b| b.id)
        .ok_or_else(|| anyhow::anyhow!("no Buy button inside the iframe"))?;

    driver.click(framed).await?;
    wait_for_title(&driver, "Paid").await?;

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome binary"]
async fn test_click_top_level_button_and_page_info() -> anyhow::Result<()> {
    init_logging();
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;

    driver.navigate(&server.url()).await?;
    assert_eq!(driver.title().await?, "Shop");
    assert!(driver.url().await?.starts_with(&server.url()));

    let buttons = elements_named(&driver, "button", "Buy").await?;
    let top = buttons
        .first()
        .and_then(|b| b.id)
        .ok_or_else(|| anyhow::anyhow!("no Buy button"))?;
    driver.click(top).await?;
    wait_for_title(&driver, "Bought").await?;

    let screenshot = driver.screenshot().await?;
    assert_eq!(&screenshot[..4], b"\x89PNG");

    driver.close().await?;
    Ok(())
}

/// Id of the first element whose name is `name` and whose role contains `role`.
async fn element_id(driver: &ChromeDriver, role: &str, name: &str) -> anyhow::Result<u32> {
    let tree = driver.accessibility_tree().await?;
    let count = tree.to_str().matches("raw_id=").count() as u32;
    (1..=count)
        .filter_map(|raw_id| tree.element_by_id(raw_id).ok())
        .find(|e| {
            e.name.as_deref() == Some(name)
                && e.element_type
                    .as_deref()
                    .is_some_and(|t| t.to_ascii_lowercase().contains(role))
        })
        .and_then(|e| e.id)
        .ok_or_else(|| anyhow::anyhow!("no {} named {:?}", role, name))
}

#[tokio::test]
#[ignore = "requires a Chrome binary"]
async fn test_select_picks_option_by_text() -> anyhow::Result<()> {
    init_logging();
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;

    driver.navigate(&format!("{}/form", server.url())).await?;
    let size = element_id(&driver, "combobox", "Size").await?;
    assert_eq!(driver.select(size, "Small").await?, "s");
    wait_for_title(&driver, "Size s").await?;

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome binary"]
async fn test_click_on_option_selects_it() -> anyhow::Result<()> {
    init_logging();
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;

    driver.navigate(&format!("{}/form", server.url())).await?;
    let large = element_id(&driver, "option", "Large").await?;
    driver.click(large).await?;
    wait_for_title(&driver, "Size l").await?;

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome binary"]
async fn test_drag_and_drop_between_elements() -> anyhow::Result<()> {
    init_logging();
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;

    driver.navigate(&format!("{}/form", server.url())).await?;
    let source = element_id(&driver, "button", "Source").await?;
    let target = element_id(&driver, "button", "Target").await?;
    driver.drag_and_drop(source, target).await?;
    wait_for_title(&driver, "Dropped").await?;

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Chrome binary"]
async fn test_cross_site_iframe_elements_are_reachable() -> anyhow::Result<()> {
    init_logging();
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let driver = create_headless_driver().await?;

    // 127.0.0.1 and localhost are different sites, so the checkout runs in its own process
    let checkout = format!("http://localhost:{}/checkout", server.addr().port());
    driver
        .navigate(&format!("{}/embed?src={}", server.url(), checkout))
        .await?;

    let buttons = elements_named(&driver, "button", "Buy").await?;
    assert_eq!(buttons.len(), 2, "{}", driver.accessibility_tree().await?.to_str());
    let framed = buttons
        .iter()
        .find(|b| !b.frame_chain.is_empty())
        .and_then(|b| b.id)
        .ok_or_else(|| anyhow::anyhow!("no Buy button inside the iframe"))?;
    driver.find_element(framed).await?;
    driver.click(framed).await?;

    driver.close().await?;
    Ok(())
}
