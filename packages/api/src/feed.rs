//! Feed loading: one query over `posts`, newest first.

use std::sync::{Mutex, MutexGuard, PoisonError};

use store::models::decode_all;
use store::{CollectionPath, DocumentStore, OrderBy, Post};

use crate::error::AppError;

/// "Still loading" and "loaded, zero posts" are different states.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FeedState {
    #[default]
    NotLoaded,
    Loaded(Vec<Post>),
}

impl FeedState {
    pub fn posts(&self) -> &[Post] {
        match self {
            FeedState::NotLoaded => &[],
            FeedState::Loaded(posts) => posts,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, FeedState::Loaded(_))
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: FeedState,
    last_error: Option<AppError>,
}

#[derive(Debug)]
pub struct FeedLoader<S> {
    store: S,
    inner: Mutex<Inner>,
}

impl<S: DocumentStore> FeedLoader<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch every post and replace the previous result.
    ///
    /// On failure the error is logged and kept in [`last_error`](Self::last_error),
    /// and the previous list (empty if there is none) is returned unchanged.
    pub async fn load_posts(&self) -> Vec<Post> {
        let result = self
            .store
            .get_all(&CollectionPath::posts(), &OrderBy::newest_first())
            .await;

        let mut inner = self.lock();
        match result {
            Ok(docs) => {
                let posts = decode_all(&docs, Post::from_document);
                tracing::debug!("Loaded {} posts", posts.len());
                inner.state = FeedState::Loaded(posts.clone());
                inner.last_error = None;
                posts
            }
            Err(e) => {
                tracing::error!("Failed to load posts: {}", e);
                inner.last_error = Some(AppError::from_backend(e));
                inner.state.posts().to_vec()
            }
        }
    }

    pub fn state(&self) -> FeedState {
        self.lock().state.clone()
    }

    pub fn last_error(&self) -> Option<AppError> {
        self.lock().last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use store::{BackendCall, BackendError, DocumentPath, DocumentStore, MemoryBackend, NewDocument};

    async fn add_post(backend: &MemoryBackend, title: &str) {
        backend
            .create_document(
                &CollectionPath::posts(),
                NewDocument::new()
                    .set("title", title)
                    .set("content", "body")
                    .set("imageUrl", serde_json::Value::Null)
                    .set("userId", "u1")
                    .server_timestamp("createdAt"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_not_loaded_differs_from_empty() {
        let loader = FeedLoader::new(MemoryBackend::new());
        assert_eq!(loader.state(), FeedState::NotLoaded);

        assert!(loader.load_posts().await.is_empty());
        assert_eq!(loader.state(), FeedState::Loaded(vec![]));
        assert!(loader.state().is_loaded());
    }

    #[tokio::test]
    async fn test_newest_first_and_reload_replaces() {
        let backend = MemoryBackend::new();
        let loader = FeedLoader::new(backend.clone());
        add_post(&backend, "first").await;
        add_post(&backend, "second").await;

        let titles: Vec<_> = loader.load_posts().await.into_iter().map(|p| p.title).collect();
        assert_eq!(titles, ["second", "first"]);

        add_post(&backend, "third").await;
        let posts = loader.load_posts().await;
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].title, "third");
        assert_eq!(loader.state().posts().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_list() {
        let backend = MemoryBackend::new();
        let loader = FeedLoader::new(backend.clone());
        add_post(&backend, "kept").await;
        loader.load_posts().await;

        backend.fail_on(BackendCall::GetAll, BackendError::unavailable("offline"));
        let posts = loader.load_posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "kept");
        assert_eq!(
            loader.last_error(),
            Some(AppError::BackendUnavailable("offline".to_string()))
        );
        assert_eq!(backend.call_count(BackendCall::GetAll), 2);

        backend.clear_failures();
        loader.load_posts().await;
        assert_eq!(loader.last_error(), None);
    }

    #[tokio::test]
    async fn test_first_load_failure_stays_not_loaded() {
        let backend = MemoryBackend::new();
        backend.fail_on(BackendCall::GetAll, BackendError::unavailable("offline"));
        let loader = FeedLoader::new(backend);

        assert!(loader.load_posts().await.is_empty());
        assert_eq!(loader.state(), FeedState::NotLoaded);
    }

    #[tokio::test]
    async fn test_malformed_posts_are_skipped() {
        let backend = MemoryBackend::new();
        add_post(&backend, "good").await;
        let mut fields = serde_json::Map::new();
        fields.insert("title".into(), json!(42));
        backend.insert_document(&DocumentPath::post("broken"), fields);

        let loader = FeedLoader::new(backend);
        let posts = loader.load_posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "good");
    }
}
