//! Asset loading seam: image and stylesheet fetch.
//!
//! Fetching is the job of an external collaborator (HTTP cache, bundler,
//! demo harness); the core only holds the [`AssetLoader`] trait and the
//! per-rule [`ImageLoadHandle`] used to cancel an in-flight image load
//! when a newer request supersedes it. Fetch failures are logged and leave
//! the previous visual state intact.

use tokio::task::AbortHandle;

/// Errors surfaced by asset fetches.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The asset could not be fetched.
    #[error("failed to fetch asset {location}: {reason}")]
    Fetch {
        /// The requested location.
        location: String,
        /// Collaborator-provided failure description.
        reason: String,
    },
}

/// Collaborator that fetches assets by location.
pub trait AssetLoader: Send + Sync {
    /// Fetch a text asset (SVG document, stylesheet).
    fn fetch_text(
        &self,
        location: &str,
    ) -> impl Future<Output = Result<String, AssetError>> + Send;
}

/// Handle to one in-flight image load for a rule.
///
/// Replacing the handle aborts the superseded load, so a rapid sequence of
/// state changes never applies a stale image over a newer one.
#[derive(Debug)]
pub struct ImageLoadHandle {
    location: String,
    abort: AbortHandle,
}

impl ImageLoadHandle {
    /// Wrap a spawned load task.
    pub const fn new(location: String, abort: AbortHandle) -> Self {
        Self { location, abort }
    }

    /// The location being loaded.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Abort the in-flight load.
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

impl Drop for ImageLoadHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// In-memory loader for tests and the demo harness: serves from a fixed
/// location-to-content table.
#[derive(Debug, Default, Clone)]
pub struct StaticAssetLoader {
    entries: std::collections::BTreeMap<String, String>,
}

impl StaticAssetLoader {
    /// Create an empty loader.
    pub const fn new() -> Self {
        Self {
            entries: std::collections::BTreeMap::new(),
        }
    }

    /// Register a location with its content.
    #[must_use]
    pub fn with_asset(mut self, location: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.insert(location.into(), content.into());
        self
    }
}

impl AssetLoader for StaticAssetLoader {
    async fn fetch_text(&self, location: &str) -> Result<String, AssetError> {
        self.entries
            .get(location)
            .cloned()
            .ok_or_else(|| AssetError::Fetch {
                location: location.to_owned(),
                reason: "not registered".to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_loader_serves_registered_assets() {
        let loader = StaticAssetLoader::new().with_asset("/local/plan.svg", "<svg/>");
        let fetched = loader.fetch_text("/local/plan.svg").await.unwrap_or_default();
        assert_eq!(fetched, "<svg/>");
        assert!(loader.fetch_text("/missing.svg").await.is_err());
    }

    #[tokio::test]
    async fn dropping_a_handle_aborts_the_load() {
        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        let abort = task.abort_handle();
        drop(ImageLoadHandle::new("/slow.svg".to_owned(), abort));
        let joined = task.await;
        assert!(joined.is_err_and(|e| e.is_cancelled()));
    }
}
