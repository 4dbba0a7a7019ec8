// spider_chrome re-exports chromiumoxide API
use crate::accessibility::{AccessibilityTree, FrameRef, Platform};
use crate::chromium::{
    self, CdpElement, CdpSession, ChromiumSession, SequentialSession, SyntheticQuery,
};
use crate::driver::{AccessibilityDriver, LastTree};
use crate::error::{A11yError, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

const LAUNCH_HELP: &str = "Chrome not found. You can:\n\
                           - Install Chrome: https://www.google.com/chrome/\n\
                           - Ubuntu/Debian: sudo apt install chromium-browser\n\
                           - macOS: brew install --cask google-chrome\n\
                           - Or specify path: --chrome-path /path/to/chrome\n\
                           - Linux sandbox issue? Try: --no-sandbox";

pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    session: SequentialSession<CdpSession>,
    temp_dir: Option<PathBuf>,
    retry: RetryPolicy,
    query: SyntheticQuery,
    last_tree: LastTree,
}

/// Connection mode for Chrome browser
pub enum ConnectionMode {
    /// Sandboxed mode - launches Chrome using system installation
    Sandboxed {
        chrome_path: Option<String>,
        no_sandbox: bool,
        headless: bool,
    },
    /// Advanced mode - connects to existing Chrome on debug port
    DebugPort(u16),
}

impl ChromeDriver {
    /// Launch Chrome with auto-detection for CI environments
    pub async fn launch_auto() -> Result<Self> {
        let is_ci = std::env::var("CI").is_ok()
            || std::env::var("GITHUB_ACTIONS").is_ok()
            || std::env::var("GITLAB_CI").is_ok()
            || std::env::var("JENKINS_HOME").is_ok()
            || std::env::var("CIRCLECI").is_ok();

        Self::new(ConnectionMode::Sandboxed {
            chrome_path: None,
            no_sandbox: is_ci,
            headless: is_ci,
        })
        .await
    }

    /// Launch a headless Chrome, optionally from a custom binary
    pub async fn launch_headless(chrome_path: Option<String>, no_sandbox: bool) -> Result<Self> {
        Self::new(ConnectionMode::Sandboxed {
            chrome_path,
            no_sandbox,
            headless: true,
        })
        .await
    }

    /// Connect to existing Chrome on debug port (advanced mode)
    pub async fn connect_debug_port(port: u16) -> Result<Self> {
        Self::new(ConnectionMode::DebugPort(port)).await
    }

    /// Create new ChromeDriver with specified connection mode
    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // Unique profile per instance so parallel drivers never share state
                let unique_id = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_nanos())
                    .unwrap_or_default();
                let temp_dir = std::env::temp_dir().join(format!("robert-a11y-{}", unique_id));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    A11yError::LaunchFailed(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };
                config = config.user_data_dir(&temp_dir);
                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }
                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                }

                let config = config
                    .build()
                    .map_err(|e| A11yError::LaunchFailed(format!("{}.\n\n{}", e, LAUNCH_HELP)))?;
                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| A11yError::LaunchFailed(format!("{}.\n\n{}", e, LAUNCH_HELP)))?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                log::info!("Launched Chrome (headless={})", headless);
                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort(port) => {
                let url = format!("http://localhost:{}", port);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    A11yError::ConnectionFailed(format!(
                        "Failed to connect to Chrome on port {}. \
                             Make sure Chrome is running with --remote-debugging-port={}: {}",
                        port, port, e
                    ))
                })?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                log::info!("Connected to Chrome on port {}", port);
                (browser, None)
            }
        };

        let page = Self::active_page(&browser).await?;
        Ok(Self {
            browser,
            session: SequentialSession::new(CdpSession::new(page.clone())),
            page,
            temp_dir,
            retry: RetryPolicy::from_env(),
            query: SyntheticQuery::default(),
            last_tree: LastTree::default(),
        })
    }

    /// First page that is not one of Chrome's own, else the newest page, else a new one
    async fn active_page(browser: &Browser) -> Result<Page> {
        let pages = browser.pages().await?;

        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }

        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        browser
            .new_page("about:blank")
            .await
            .map_err(|e| A11yError::Other(format!("Failed to create page: {}", e)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_synthetic_query(mut self, query: SyntheticQuery) -> Self {
        self.query = query;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate to a URL and wait for the load event
    pub async fn navigate(&self, url: &str) -> Result<()> {
        use chromiumoxide::cdp::browser_protocol::page::{EventLoadEventFired, NavigateParams};

        let normalized_url = if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
            && !url.starts_with("about:")
            && !url.starts_with("data:")
        {
            log::debug!("Normalizing URL: {} -> https://{}", url, url);
            format!("https://{}", url)
        } else {
            url.to_string()
        };

        let _session = self.session.lock().await;
        let page = self.page();
        let mut load_events = page.event_listener::<EventLoadEventFired>().await?;

        let params = NavigateParams::builder()
            .url(&normalized_url)
            .build()
            .map_err(|e| A11yError::Other(format!("Invalid URL {}: {}", normalized_url, e)))?;
        let response = page.execute(params).await?;
        if let Some(error_text) = response.result.error_text.clone() {
            return Err(A11yError::Other(format!(
                "Navigation to {} failed: {}",
                normalized_url, error_text
            )));
        }

        match tokio::time::timeout(std::time::Duration::from_secs(30), load_events.next()).await {
            Ok(Some(_)) => log::debug!("Load event fired for {}", normalized_url),
            Ok(None) => log::warn!("Load event stream ended for {}", normalized_url),
            Err(_) => {
                return Err(A11yError::Other(format!(
                    "Timed out waiting for {} to load",
                    normalized_url
                )))
            }
        }

        self.last_tree.clear().await;
        log::info!("Navigated to {}", normalized_url);
        Ok(())
    }

    /// Clicking an `<option>` picks it in its `<select>` instead.
    pub async fn click(&self, raw_id: u32) -> Result<()> {
        let session = self.session.lock().await;
        let element = self.resolve(&session, raw_id).await?;
        if session.tag_name(&element).await? == "option" {
            session.select_option(&element, None).await?;
            return Ok(());
        }
        session.click(&element).await
    }

    pub async fn hover(&self, raw_id: u32) -> Result<()> {
        let session = self.session.lock().await;
        let element = self.resolve(&session, raw_id).await?;
        session.hover(&element).await
    }

    pub async fn type_text(&self, raw_id: u32, text: &str) -> Result<()> {
        let session = self.session.lock().await;
        let element = self.resolve(&session, raw_id).await?;
        session.type_text(&element, text).await
    }

    pub async fn drag_and_drop(&self, from_id: u32, to_id: u32) -> Result<()> {
        let session = self.session.lock().await;
        // Resolving the target invalidates the source handle, so measure it first
        let from = self.resolve(&session, from_id).await?;
        let start = session.center_of(&from).await?;
        let to = self.resolve(&session, to_id).await?;
        let end = session.center_of(&to).await?;
        session.drag(start, end).await
    }

    /// Pick `option` (its text or value) in a `<select>`, or in the `<select>` of an
    /// `<option>`. Returns the picked value.
    pub async fn select(&self, raw_id: u32, option: &str) -> Result<String> {
        let session = self.session.lock().await;
        let element = self.resolve(&session, raw_id).await?;
        session.select_option(&element, Some(option)).await
    }

    /// Close the browser connection
    pub async fn close(self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| A11yError::Other(e.to_string()))?;
        Ok(())
    }

    async fn build_tree(&self, session: &CdpSession) -> Result<AccessibilityTree> {
        self.attach_frame_targets(session).await;
        let tree = self
            .retry
            .run("accessibility tree", move || {
                chromium::build_tree(session, &self.query)
            })
            .await?;
        Ok(AccessibilityTree::Chromium(tree))
    }

    /// Hand the session a page for every cross-process iframe so it can query inside.
    async fn attach_frame_targets(&self, session: &CdpSession) {
        let targets = match session.targets().await {
            Ok(targets) => targets,
            Err(e) => {
                log::debug!("Could not list targets: {}", e);
                return;
            }
        };

        let mut frame_targets = HashMap::new();
        for target in targets.into_iter().filter(|t| t.target_type == "iframe") {
            match self
                .browser
                .get_page(TargetId::new(target.target_id.clone()))
                .await
            {
                Ok(page) => {
                    frame_targets.insert(FrameRef::new(target.target_id), page);
                }
                Err(e) => log::debug!("No session for iframe target {}: {}", target.url, e),
            }
        }
        session.set_frame_targets(frame_targets).await;
    }

    /// Resolve against the last tree, building one first if needed. The caller holds
    /// the session lock.
    async fn resolve(&self, session: &CdpSession, raw_id: u32) -> Result<CdpElement> {
        let tree = self
            .last_tree
            .get_or_build(|| self.build_tree(session))
            .await?;
        let element = tree.element_by_id(raw_id)?;
        chromium::resolve(session, &element).await
    }
}

#[async_trait]
impl AccessibilityDriver for ChromeDriver {
    type Element = CdpElement;

    fn platform(&self) -> Platform {
        Platform::Chromium
    }

    async fn accessibility_tree(&self) -> Result<Arc<AccessibilityTree>> {
        let session = self.session.lock().await;
        let tree = self.build_tree(&session).await?;
        Ok(self.last_tree.store(tree).await)
    }

    async fn find_element(&self, raw_id: u32) -> Result<CdpElement> {
        let session = self.session.lock().await;
        self.resolve(&session, raw_id).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.retry
            .run("screenshot", move || async move {
                Ok(self
                    .page()
                    .screenshot(chromiumoxide::page::ScreenshotParams::default())
                    .await?)
            })
            .await
    }

    async fn title(&self) -> Result<String> {
        self.retry
            .run("title", move || async move {
                Ok(self.page().get_title().await?.unwrap_or_default())
            })
            .await
    }

    async fn url(&self) -> Result<String> {
        self.retry
            .run("url", move || async move {
                self.page().url().await?.ok_or(A11yError::NoPage)
            })
            .await
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        // Clean up temporary directory if it exists
        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
    }
}
