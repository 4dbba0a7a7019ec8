use super::frames;
use super::resolver;
use super::session::ChromiumSession;
use super::synthetic::SyntheticQuery;
use crate::accessibility::{AccessibilityElement, ChromiumTree};
use crate::error::Result;
use tokio::sync::{Mutex, MutexGuard};

/// A session whose tree builds and resolutions never overlap.
///
/// Frame switches and pushed node ids are session-wide state, so two resolutions
/// running at once would query in each other's frames. Every entry point here takes
/// the same lock; [`lock`](Self::lock) keeps it across a resolution and the action
/// performed on its result.
pub struct SequentialSession<S> {
    inner: Mutex<S>,
}

impl<S: ChromiumSession> SequentialSession<S> {
    pub fn new(session: S) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock().await
    }

    pub async fn build_tree(&self, query: &SyntheticQuery) -> Result<ChromiumTree> {
        let session = self.lock().await;
        frames::build_tree(&*session, query).await
    }

    pub async fn resolve(&self, element: &AccessibilityElement) -> Result<S::Element> {
        let session = self.lock().await;
        resolver::resolve(&*session, element).await
    }
}
