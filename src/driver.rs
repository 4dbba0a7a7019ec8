use crate::accessibility::{AccessibilityTree, Platform};
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// What every backend offers: a fresh tree per call, and resolution of that tree's ids
/// into live handles.
#[async_trait]
pub trait AccessibilityDriver: Send + Sync {
    type Element: Send + Sync;

    fn platform(&self) -> Platform;

    /// Build a new tree and remember it for later `find_element` calls.
    async fn accessibility_tree(&self) -> Result<Arc<AccessibilityTree>>;

    /// Resolve `raw_id` against the last tree this driver produced, building one if
    /// there is none yet.
    async fn find_element(&self, raw_id: u32) -> Result<Self::Element>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn title(&self) -> Result<String>;

    async fn url(&self) -> Result<String>;
}

/// The last tree a driver handed out.
#[derive(Debug, Default)]
pub struct LastTree(Mutex<Option<Arc<AccessibilityTree>>>);

impl LastTree {
    pub async fn store(&self, tree: AccessibilityTree) -> Arc<AccessibilityTree> {
        let tree = Arc::new(tree);
        *self.0.lock().await = Some(Arc::clone(&tree));
        tree
    }

    pub async fn get(&self) -> Option<Arc<AccessibilityTree>> {
        self.0.lock().await.clone()
    }

    /// Forget the tree, e.g. after a navigation.
    pub async fn clear(&self) {
        *self.0.lock().await = None;
    }

    pub async fn get_or_build<F, Fut>(&self, build: F) -> Result<Arc<AccessibilityTree>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessibilityTree>>,
    {
        if let Some(tree) = self.get().await {
            return Ok(tree);
        }
        let tree = build().await?;
        Ok(self.store(tree).await)
    }
}
