use super::appium::{AppiumClient, AppiumElement, NATIVE_APP};
use super::locator::{self, Locator};
use crate::accessibility::{
    AccessibilityElement, AccessibilityTree, Platform, UiAutomator2Tree, XcuiTestTree,
};
use crate::driver::{AccessibilityDriver, LastTree};
use crate::error::Result;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct AppiumOptions {
    /// Switch to `NATIVE_APP` before reading the tree and a `WEBVIEW` before reading
    /// title or URL
    pub autoswitch_contexts: bool,
    /// Wait before every page-source fetch
    pub delay: Duration,
    /// Fetch the page source twice and keep the second; some cloud providers return a
    /// stale first response
    pub double_fetch_page_source: bool,
}

impl Default for AppiumOptions {
    fn default() -> Self {
        Self {
            autoswitch_contexts: true,
            delay: Duration::ZERO,
            double_fetch_page_source: false,
        }
    }
}

pub struct AppiumDriver {
    client: AppiumClient,
    platform: Platform,
    options: AppiumOptions,
    retry: RetryPolicy,
    last_tree: LastTree,
}

impl AppiumDriver {
    /// Android sessions get UIAutomator2 trees, everything else XCUITest.
    pub fn new(client: AppiumClient, options: AppiumOptions) -> Self {
        let platform = match client.platform_name() {
            Some(name) if name.eq_ignore_ascii_case("android") => Platform::UiAutomator2,
            _ => Platform::XcuiTest,
        };
        log::debug!("Appium session {} uses {}", client.session_id(), platform);

        Self {
            client,
            platform,
            options,
            retry: RetryPolicy::from_env(),
            last_tree: LastTree::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &AppiumClient {
        &self.client
    }

    pub fn locator_for(&self, element: &AccessibilityElement) -> Locator {
        match self.platform {
            Platform::UiAutomator2 => locator::uiautomator2_xpath(element),
            _ => locator::xcuitest_predicate(element),
        }
    }

    pub async fn click(&self, raw_id: u32) -> Result<()> {
        let element = self.find_element(raw_id).await?;
        self.client.click(&element).await
    }

    pub async fn type_text(&self, raw_id: u32, text: &str) -> Result<()> {
        let element = self.find_element(raw_id).await?;
        self.client.send_keys(&element, text).await
    }

    pub async fn drag_and_drop(&self, from_id: u32, to_id: u32) -> Result<()> {
        let from = self.find_element(from_id).await?;
        let to = self.find_element(to_id).await?;
        self.client.drag_and_drop(&from, &to).await
    }

    async fn ensure_native_app(&self) -> Result<()> {
        if !self.options.autoswitch_contexts {
            return Ok(());
        }
        if self.client.current_context().await? != NATIVE_APP {
            self.client.switch_context(NATIVE_APP).await?;
        }
        Ok(())
    }

    async fn ensure_webview(&self) -> Result<()> {
        if !self.options.autoswitch_contexts {
            return Ok(());
        }
        if self.client.current_context().await?.contains("WEBVIEW") {
            return Ok(());
        }
        let contexts = self.client.contexts().await?;
        match contexts.iter().find(|context| context.contains("WEBVIEW")) {
            Some(webview) => self.client.switch_context(webview).await,
            None => Ok(()),
        }
    }

    async fn build_tree(&self) -> Result<AccessibilityTree> {
        self.ensure_native_app().await?;
        if !self.options.delay.is_zero() {
            tokio::time::sleep(self.options.delay).await;
        }
        if self.options.double_fetch_page_source {
            self.client.page_source().await?;
        }

        let source = self.client.page_source().await?;
        Ok(match self.platform {
            Platform::UiAutomator2 => UiAutomator2Tree::new(&source).into(),
            _ => XcuiTestTree::new(source).into(),
        })
    }
}

#[async_trait]
impl AccessibilityDriver for AppiumDriver {
    type Element = AppiumElement;

    fn platform(&self) -> Platform {
        self.platform
    }

    async fn accessibility_tree(&self) -> Result<Arc<AccessibilityTree>> {
        let tree = self.build_tree().await?;
        Ok(self.last_tree.store(tree).await)
    }

    async fn find_element(&self, raw_id: u32) -> Result<AppiumElement> {
        self.ensure_native_app().await?;
        let tree = self.last_tree.get_or_build(|| self.build_tree()).await?;
        let element = tree.element_by_id(raw_id)?;
        let locator = self.locator_for(&element);
        self.client.find_element(locator.using, &locator.value).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.retry
            .run("screenshot", move || self.client.screenshot())
            .await
    }

    /// Empty when the app has no web view
    async fn title(&self) -> Result<String> {
        self.ensure_webview().await?;
        Ok(self.client.title().await.unwrap_or_default())
    }

    async fn url(&self) -> Result<String> {
        self.ensure_webview().await?;
        Ok(self.client.url().await.unwrap_or_default())
    }
}
