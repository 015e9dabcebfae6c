//! # Post detail synchronizer
//!
//! Keeps one post and its comments live while the detail screen is mounted.
//!
//! ```text
//! Idle ──mount──▶ Loading ──▶ Live ◀──▶ Error
//!                    │          │
//!                    └──────────┴──▶ NotFound   (terminal, one NavigateBack)
//! ```
//!
//! [`PostDetailSync::mount`] opens two independent subscriptions: the post
//! document and its `comments` sub-collection, oldest first. Every comment
//! emission replaces the displayed list. Subscription errors are surfaced as
//! [`DetailEvent::Alert`] and leave the subscription open.
//!
//! Each mount gets a generation number. Callbacks carry the generation they
//! were registered with and are dropped once it is no longer current, so an
//! emission that races an unmount or a switch to another post never touches
//! the published [`DetailSnapshot`].

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use store::models::decode_all;
use store::{
    BackendError, CollectionPath, Comment, Document, DocumentPath, DocumentSnapshot, DocumentStore,
    OrderBy, Post, Subscription,
};
use tokio::sync::{mpsc, watch};

use crate::error::{AppError, Notice};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailPhase {
    #[default]
    Idle,
    Loading,
    Live,
    NotFound,
    Error(String),
}

/// What the detail screen renders.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailSnapshot {
    pub phase: DetailPhase,
    pub post: Option<Post>,
    pub comments: Vec<Comment>,
    pub comment_error: Option<String>,
}

impl DetailSnapshot {
    fn loading() -> Self {
        Self {
            phase: DetailPhase::Loading,
            ..Self::default()
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == DetailPhase::Loading
    }
}

/// One-off signals for the screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetailEvent {
    /// The post does not exist; leave the screen.
    NavigateBack,
    Alert(Notice),
}

struct Shared {
    generation: Mutex<u64>,
    state: watch::Sender<DetailSnapshot>,
    events: mpsc::UnboundedSender<DetailEvent>,
}

impl Shared {
    fn bump(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        *generation
    }

    /// Apply `update` if `generation` is still current. The generation lock is
    /// held throughout so an unmount cannot interleave with the update.
    fn apply(
        &self,
        generation: u64,
        update: impl FnOnce(&mut DetailSnapshot) -> Option<DetailEvent>,
    ) {
        let current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != generation {
            tracing::trace!("Dropping emission for stale mount {}", generation);
            return;
        }
        let mut event = None;
        self.state.send_modify(|snapshot| event = update(snapshot));
        if let Some(event) = event {
            // The screen may have stopped listening.
            let _ = self.events.send(event);
        }
        drop(current);
    }
}

fn on_post(snapshot: &mut DetailSnapshot, result: Result<DocumentSnapshot, BackendError>) -> Option<DetailEvent> {
    if snapshot.phase == DetailPhase::NotFound {
        return None;
    }
    let snap = match result {
        Ok(snap) => snap,
        Err(e) => {
            tracing::error!("Post subscription error: {}", e);
            let err = AppError::from_backend(e);
            snapshot.phase = DetailPhase::Error(err.to_string());
            return Some(DetailEvent::Alert(err.notice()));
        }
    };
    let Some(doc) = snap.to_document() else {
        tracing::info!("Post {} no longer exists", snap.id);
        snapshot.phase = DetailPhase::NotFound;
        snapshot.post = None;
        return Some(DetailEvent::NavigateBack);
    };
    match Post::from_document(&doc) {
        Ok(post) => {
            snapshot.phase = DetailPhase::Live;
            snapshot.post = Some(post);
            None
        }
        Err(e) => {
            tracing::error!("Post {} is malformed: {}", doc.id, e);
            let err = AppError::Unknown(format!("The post could not be read: {e}"));
            snapshot.phase = DetailPhase::Error(err.to_string());
            Some(DetailEvent::Alert(err.notice()))
        }
    }
}

fn on_comments(snapshot: &mut DetailSnapshot, result: Result<Vec<Document>, BackendError>) -> Option<DetailEvent> {
    if snapshot.phase == DetailPhase::NotFound {
        return None;
    }
    match result {
        Ok(docs) => {
            snapshot.comments = decode_all(&docs, Comment::from_document);
            snapshot.comment_error = None;
            None
        }
        Err(e) => {
            tracing::error!("Comment subscription error: {}", e);
            let err = AppError::from_backend(e);
            snapshot.comment_error = Some(err.to_string());
            Some(DetailEvent::Alert(err.notice()))
        }
    }
}

pub struct PostDetailSync<S> {
    store: S,
    shared: Arc<Shared>,
    post_id: Option<String>,
    post_sub: Subscription,
    comments_sub: Subscription,
}

impl<S: DocumentStore> PostDetailSync<S> {
    pub fn new(store: S) -> (Self, mpsc::UnboundedReceiver<DetailEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(DetailSnapshot::default());
        let sync = Self {
            store,
            shared: Arc::new(Shared {
                generation: Mutex::new(0),
                state,
                events,
            }),
            post_id: None,
            post_sub: Subscription::inert(),
            comments_sub: Subscription::inert(),
        };
        (sync, events_rx)
    }

    pub fn snapshot(&self) -> DetailSnapshot {
        self.shared.state.borrow().clone()
    }

    /// Receiver that wakes on every snapshot change.
    pub fn watch(&self) -> watch::Receiver<DetailSnapshot> {
        self.shared.state.subscribe()
    }

    pub fn post_id(&self) -> Option<&str> {
        self.post_id.as_deref()
    }

    /// Start following `post_id`. Mounting the id that is already mounted
    /// does nothing; any other id replaces the current subscriptions.
    pub fn mount(&mut self, post_id: &str) {
        if self.post_id.as_deref() == Some(post_id) {
            return;
        }
        self.detach();

        let generation = {
            let mut current = self.shared.generation.lock().unwrap_or_else(PoisonError::into_inner);
            *current += 1;
            self.shared.state.send_replace(DetailSnapshot::loading());
            *current
        };
        tracing::debug!("Mounting post {} (generation {})", post_id, generation);
        self.post_id = Some(post_id.to_string());

        let shared = self.shared.clone();
        self.post_sub = self
            .store
            .subscribe_document(&DocumentPath::post(post_id), move |result| {
                shared.apply(generation, |snapshot| on_post(snapshot, result));
            });

        let shared = self.shared.clone();
        self.comments_sub = self.store.subscribe_collection(
            &CollectionPath::comments_of(post_id),
            &OrderBy::oldest_first(),
            move |result| {
                shared.apply(generation, |snapshot| on_comments(snapshot, result));
            },
        );
    }

    /// Stop following. Later deliveries are ignored. Safe to call twice.
    pub fn unmount(&mut self) {
        if let Some(post_id) = self.post_id.take() {
            tracing::debug!("Unmounting post {}", post_id);
        }
        self.detach();
    }

    fn detach(&mut self) {
        self.shared.bump();
        self.post_sub.cancel();
        self.comments_sub.cancel();
        self.post_id = None;
    }
}

impl<S> Drop for PostDetailSync<S> {
    fn drop(&mut self) {
        self.shared.bump();
        self.post_sub.cancel();
        self.comments_sub.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::{CommentDraft, CommentSubmission};
    use crate::session::Session;
    use serde_json::json;
    use store::subscription::ActiveFlag;
    use store::{CreatedDocument, ErrorCode, Fields, Identity, MemoryBackend, NewDocument};

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn post_fields(title: &str) -> Fields {
        fields(json!({
            "title": title,
            "content": "body",
            "imageUrl": null,
            "userId": "u1",
            "createdAt": { "seconds": 1_700_000_000, "nanos": 0 },
        }))
    }

    fn comment_fields(content: &str, seconds: i64) -> Fields {
        fields(json!({
            "content": content,
            "userId": "u2",
            "createdAt": { "seconds": seconds, "nanos": 0 },
        }))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DetailEvent>) -> Vec<DetailEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn with_post(id: &str) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.insert_document(&DocumentPath::post(id), post_fields("Hello"));
        backend
    }

    #[tokio::test]
    async fn test_mount_goes_live() {
        let backend = with_post("p1");
        let (mut sync, mut events) = PostDetailSync::new(backend.clone());
        assert_eq!(sync.snapshot().phase, DetailPhase::Idle);

        sync.mount("p1");
        let snapshot = sync.snapshot();
        assert_eq!(snapshot.phase, DetailPhase::Live);
        assert_eq!(snapshot.post.as_ref().map(|p| p.title.as_str()), Some("Hello"));
        assert!(snapshot.comments.is_empty());
        assert_eq!(sync.post_id(), Some("p1"));
        assert_eq!(backend.listener_count(), 2);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_comments_arrive_in_submission_order() {
        let backend = with_post("p1");
        let (mut sync, _events) = PostDetailSync::new(backend.clone());
        sync.mount("p1");

        let session = Session::fixed(Some(Identity::new("u2", None)));
        let comments = CommentSubmission::new(backend.clone(), session);
        comments
            .submit_comment("p1", &mut CommentDraft::new("A"))
            .await
            .unwrap();
        comments
            .submit_comment("p1", &mut CommentDraft::new("B"))
            .await
            .unwrap();

        let texts: Vec<_> = sync
            .snapshot()
            .comments
            .into_iter()
            .map(|c| c.content)
            .collect();
        assert_eq!(texts, ["A", "B"]);
    }

    #[tokio::test]
    async fn test_each_emission_replaces_the_list() {
        let backend = with_post("p1");
        let (mut sync, _events) = PostDetailSync::new(backend.clone());
        sync.mount("p1");
        let comments = CollectionPath::comments_of("p1");

        backend.insert_document(&comments.doc("c2"), comment_fields("second", 200));
        backend.insert_document(&comments.doc("c1"), comment_fields("first", 100));
        let texts = |sync: &PostDetailSync<MemoryBackend>| -> Vec<String> {
            sync.snapshot().comments.into_iter().map(|c| c.content).collect()
        };
        assert_eq!(texts(&sync), ["first", "second"]);

        backend.insert_document(&comments.doc("c2"), comment_fields("second, edited", 200));
        assert_eq!(texts(&sync), ["first", "second, edited"]);

        backend.delete_document(&comments.doc("c1"));
        assert_eq!(texts(&sync), ["second, edited"]);
    }

    #[tokio::test]
    async fn test_deleted_post_navigates_back_once() {
        let backend = with_post("p1");
        let (mut sync, mut events) = PostDetailSync::new(backend.clone());
        sync.mount("p1");

        assert!(backend.delete_document(&DocumentPath::post("p1")));
        assert_eq!(sync.snapshot().phase, DetailPhase::NotFound);
        assert!(sync.snapshot().post.is_none());

        // Recreated under the same id: still terminal for this mount.
        backend.insert_document(&DocumentPath::post("p1"), post_fields("Back"));
        backend.delete_document(&DocumentPath::post("p1"));
        assert_eq!(sync.snapshot().phase, DetailPhase::NotFound);
        assert_eq!(drain(&mut events), vec![DetailEvent::NavigateBack]);
    }

    #[tokio::test]
    async fn test_missing_post_is_not_found_immediately() {
        let backend = MemoryBackend::new();
        let (mut sync, mut events) = PostDetailSync::new(backend);
        sync.mount("nope");
        assert_eq!(sync.snapshot().phase, DetailPhase::NotFound);
        assert_eq!(drain(&mut events), vec![DetailEvent::NavigateBack]);
    }

    #[tokio::test]
    async fn test_errors_are_surfaced_without_teardown() {
        let backend = with_post("p1");
        let (mut sync, mut events) = PostDetailSync::new(backend.clone());
        sync.mount("p1");

        backend.emit_collection_error(
            &CollectionPath::comments_of("p1"),
            BackendError::new(ErrorCode::PermissionDenied, "Missing or insufficient permissions"),
        );
        let snapshot = sync.snapshot();
        assert_eq!(snapshot.phase, DetailPhase::Live);
        assert!(snapshot.comment_error.is_some());

        backend.emit_document_error(&DocumentPath::post("p1"), BackendError::unavailable("offline"));
        assert!(matches!(sync.snapshot().phase, DetailPhase::Error(_)));

        let events = drain(&mut events);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, DetailEvent::Alert(_))));

        // The backend recovered and resumed emitting.
        backend.insert_document(&DocumentPath::post("p1"), post_fields("Hello again"));
        assert_eq!(sync.snapshot().phase, DetailPhase::Live);
        assert_eq!(backend.listener_count(), 2);
    }

    #[tokio::test]
    async fn test_unmount_detaches_and_is_idempotent() {
        let backend = with_post("p1");
        let (mut sync, mut events) = PostDetailSync::new(backend.clone());
        sync.mount("p1");
        let before = sync.snapshot();

        sync.unmount();
        sync.unmount();
        assert_eq!(backend.listener_count(), 0);
        assert_eq!(sync.post_id(), None);

        backend.delete_document(&DocumentPath::post("p1"));
        assert_eq!(sync.snapshot(), before);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_remount_same_id_is_noop_and_drop_detaches() {
        let backend = with_post("p1");
        let (mut sync, _events) = PostDetailSync::new(backend.clone());
        sync.mount("p1");
        sync.mount("p1");
        assert_eq!(backend.listener_count(), 2);

        backend.insert_document(&DocumentPath::post("p2"), post_fields("Other"));
        sync.mount("p2");
        assert_eq!(backend.listener_count(), 2);
        assert_eq!(sync.snapshot().post.unwrap().id, "p2");

        drop(sync);
        assert_eq!(backend.listener_count(), 0);
    }

    type PostListener = Box<dyn Fn(Result<DocumentSnapshot, BackendError>) + Send + Sync>;
    type CommentListener = Box<dyn Fn(Result<Vec<Document>, BackendError>) + Send + Sync>;

    /// Store whose listeners keep firing after cancellation, like a callback
    /// already queued on the event loop.
    #[derive(Clone, Default)]
    struct ScriptedStore {
        posts: Arc<Mutex<Vec<(String, PostListener)>>>,
        comments: Arc<Mutex<Vec<CommentListener>>>,
    }

    impl ScriptedStore {
        fn emit_post(&self, index: usize, fields: Option<Fields>) {
            let posts = self.posts.lock().unwrap();
            let (id, listener) = &posts[index];
            listener(Ok(DocumentSnapshot {
                id: id.clone(),
                fields,
            }));
        }

        fn emit_comments(&self, index: usize, docs: Vec<Document>) {
            self.comments.lock().unwrap()[index](Ok(docs));
        }
    }

    impl DocumentStore for ScriptedStore {
        async fn create_document(
            &self,
            _collection: &CollectionPath,
            _doc: NewDocument,
        ) -> Result<CreatedDocument, BackendError> {
            Err(BackendError::unavailable("scripted"))
        }

        async fn get_all(
            &self,
            _collection: &CollectionPath,
            _order: &OrderBy,
        ) -> Result<Vec<Document>, BackendError> {
            Err(BackendError::unavailable("scripted"))
        }

        fn subscribe_document(
            &self,
            path: &DocumentPath,
            listener: impl Fn(Result<DocumentSnapshot, BackendError>) + Send + Sync + 'static,
        ) -> Subscription {
            self.posts
                .lock()
                .unwrap()
                .push((path.id.clone(), Box::new(listener)));
            Subscription::new(ActiveFlag::new(), || {})
        }

        fn subscribe_collection(
            &self,
            _collection: &CollectionPath,
            _order: &OrderBy,
            listener: impl Fn(Result<Vec<Document>, BackendError>) + Send + Sync + 'static,
        ) -> Subscription {
            self.comments.lock().unwrap().push(Box::new(listener));
            Subscription::new(ActiveFlag::new(), || {})
        }
    }

    #[tokio::test]
    async fn test_late_emission_after_unmount_is_dropped() {
        let store = ScriptedStore::default();
        let (mut sync, mut events) = PostDetailSync::new(store.clone());
        sync.mount("p1");
        assert!(sync.snapshot().is_loading());
        store.emit_post(0, Some(post_fields("Hello")));
        assert_eq!(sync.snapshot().phase, DetailPhase::Live);

        sync.unmount();
        let before = sync.snapshot();
        store.emit_post(0, None);
        store.emit_comments(
            0,
            vec![Document {
                id: "c1".to_string(),
                fields: comment_fields("late", 1),
            }],
        );
        assert_eq!(sync.snapshot(), before);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_emission_for_previous_post_is_dropped() {
        let store = ScriptedStore::default();
        let (mut sync, mut events) = PostDetailSync::new(store.clone());
        sync.mount("p1");
        sync.mount("p2");
        store.emit_post(1, Some(post_fields("Second")));

        store.emit_post(0, None);
        store.emit_comments(
            0,
            vec![Document {
                id: "c1".to_string(),
                fields: comment_fields("from p1", 1),
            }],
        );

        let snapshot = sync.snapshot();
        assert_eq!(snapshot.phase, DetailPhase::Live);
        assert_eq!(snapshot.post.unwrap().id, "p2");
        assert!(snapshot.comments.is_empty());
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_blank_timestamp_renders_empty() {
        let store = ScriptedStore::default();
        let (mut sync, _events) = PostDetailSync::new(store.clone());
        sync.mount("p1");
        store.emit_comments(
            0,
            vec![Document {
                id: "c1".to_string(),
                fields: fields(json!({ "content": "pending", "userId": "u1" })),
            }],
        );
        let comments = sync.snapshot().comments;
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].created_label(), "");
    }
}
