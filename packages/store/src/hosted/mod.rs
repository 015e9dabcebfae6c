//! # Hosted backend over REST
//!
//! [`HostedBackend`] talks to a hosted project through its public REST
//! endpoints:
//!
//! | Port | Endpoint |
//! |------|----------|
//! | [`IdentityBackend`] | `identitytoolkit.googleapis.com/v1/accounts:signInWithPassword` / `:signUp`, token refresh on `securetoken.googleapis.com` |
//! | [`DocumentStore`] | `firestore.googleapis.com/v1/.../documents`: `:commit` for creates, `:runQuery` for ordered reads, `GET` for single documents |
//! | [`BlobStore`] | `firebasestorage.googleapis.com/v0/b/{bucket}/o`: upload, then read the download token for the public URL |
//!
//! The REST surface has no streaming listener, so `subscribe_*` re-reads the
//! document or query every `poll_interval_ms` on a tokio task and delivers only
//! when the result differs from the last delivery. The first read is delivered
//! as soon as it completes. Cancelling the [`Subscription`] aborts the task and
//! the [`ActiveFlag`] is checked before every delivery.
//!
//! The signed-in session lives in memory only; a restart begins signed out.

mod wire;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::backend::{
    BlobStore, CreatedDocument, Document, DocumentSnapshot, DocumentStore, IdentityBackend, NewDocument,
};
use crate::config::HostedProject;
use crate::error::BackendError;
use crate::models::Identity;
use crate::schema::{encode_object_path, CollectionPath, DocumentPath, OrderBy};
use crate::subscription::{ActiveFlag, Subscription};

use wire::{
    commit_body, identity_error, run_query_body, service_error, AuthResponse, CommitResponse,
    ObjectMetadata, QueryRow, RawDocument, RefreshResponse,
};

const IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
const STORAGE_URL: &str = "https://firebasestorage.googleapis.com/v0";

/// Refresh the id token this long before it expires.
const TOKEN_SLACK_SECS: i64 = 60;

type AuthListener = Arc<dyn Fn(Option<Identity>) + Send + Sync>;

struct AuthSession {
    identity: Identity,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl AuthSession {
    fn new(identity: Identity, id_token: String, refresh_token: String, expires_in: &str) -> Self {
        let secs = expires_in.trim().parse::<i64>().unwrap_or(3600);
        Self {
            identity,
            id_token,
            refresh_token,
            expires_at: Utc::now() + TimeDelta::seconds(secs),
        }
    }
}

#[derive(Default)]
struct AuthState {
    session: Option<AuthSession>,
    next_slot: u64,
    listeners: HashMap<u64, (ActiveFlag, AuthListener)>,
}

impl AuthState {
    fn current(&self) -> Option<Identity> {
        self.session.as_ref().map(|s| s.identity.clone())
    }

    /// Replace the session and collect the listeners to notify if the
    /// signed-in identity changed.
    fn replace(&mut self, session: Option<AuthSession>) -> Vec<(ActiveFlag, AuthListener)> {
        let before = self.current();
        self.session = session;
        if before == self.current() {
            return Vec::new();
        }
        self.listeners.values().cloned().collect()
    }
}

fn notify(listeners: Vec<(ActiveFlag, AuthListener)>, identity: Option<Identity>) {
    for (active, listener) in listeners {
        if active.is_active() {
            listener(identity.clone());
        }
    }
}

struct Inner {
    http: Client,
    project: HostedProject,
    auth: Mutex<AuthState>,
}

/// Identity, document and blob backend for a hosted project.
#[derive(Clone)]
pub struct HostedBackend {
    inner: Arc<Inner>,
}

impl fmt::Debug for HostedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedBackend")
            .field("project_id", &self.inner.project.project_id)
            .field("storage_bucket", &self.inner.project.storage_bucket)
            .finish()
    }
}

impl HostedBackend {
    pub fn new(project: HostedProject) -> Self {
        tracing::info!("Using hosted project {}", project.project_id);
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                project,
                auth: Mutex::new(AuthState::default()),
            }),
        }
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.inner.project.poll_interval_ms)
    }

    /// Run `fetch` now and then every poll interval until cancelled,
    /// delivering each result that differs from the previous one.
    fn poll<T, F, Fut>(
        &self,
        fetch: F,
        listener: impl Fn(Result<T, BackendError>) + Send + Sync + 'static,
    ) -> Subscription
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BackendError>> + Send,
    {
        let active = ActiveFlag::new();
        let interval = self.poll_interval();
        let flag = active.clone();
        let task = tokio::spawn(async move {
            let mut last: Option<Result<T, BackendError>> = None;
            while flag.is_active() {
                let result = fetch().await;
                if last.as_ref() != Some(&result) && flag.is_active() {
                    if let Err(e) = &result {
                        tracing::warn!("Live read failed: {}", e);
                    }
                    listener(result.clone());
                    last = Some(result);
                }
                tokio::time::sleep(interval).await;
            }
        });
        Subscription::new(active, move || task.abort())
    }
}

impl Inner {
    fn lock_auth(&self) -> MutexGuard<'_, AuthState> {
        self.auth.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/(default)/documents",
            self.project.project_id
        )
    }

    fn bucket_url(&self) -> String {
        format!("{STORAGE_URL}/b/{}", self.project.storage_bucket)
    }

    /// Current id token, refreshed first if it is about to expire.
    async fn bearer(&self) -> Result<Option<String>, BackendError> {
        let refresh_token = {
            let auth = self.lock_auth();
            match &auth.session {
                None => return Ok(None),
                Some(session)
                    if session.expires_at - TimeDelta::seconds(TOKEN_SLACK_SECS) > Utc::now() =>
                {
                    return Ok(Some(session.id_token.clone()));
                }
                Some(session) => session.refresh_token.clone(),
            }
        };

        tracing::debug!("Refreshing id token");
        let request = self
            .http
            .post(TOKEN_URL)
            .query(&[("key", self.project.api_key.as_str())])
            .json(&json!({ "grant_type": "refresh_token", "refresh_token": refresh_token }));
        let refreshed: RefreshResponse = match send_json(request, identity_error).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                tracing::warn!("Token refresh failed, signing out: {}", e);
                let listeners = self.lock_auth().replace(None);
                notify(listeners, None);
                return Err(e);
            }
        };

        let mut auth = self.lock_auth();
        let Some(session) = auth.session.as_mut() else {
            return Ok(None);
        };
        *session = AuthSession::new(
            session.identity.clone(),
            refreshed.id_token,
            refreshed.refresh_token,
            &refreshed.expires_in,
        );
        Ok(Some(session.id_token.clone()))
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        Ok(match self.bearer().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn credentials(&self, endpoint: &str, email: &str, password: &str) -> Result<Identity, BackendError> {
        let request = self
            .http
            .post(format!("{IDENTITY_URL}/accounts:{endpoint}"))
            .query(&[("key", self.project.api_key.as_str())])
            .json(&json!({ "email": email, "password": password, "returnSecureToken": true }));
        let response: AuthResponse = send_json(request, identity_error).await?;

        let identity = Identity::new(response.local_id, response.email.or_else(|| Some(email.to_string())));
        let session = AuthSession::new(
            identity.clone(),
            response.id_token,
            response.refresh_token,
            &response.expires_in,
        );
        let listeners = self.lock_auth().replace(Some(session));
        notify(listeners, Some(identity.clone()));
        Ok(identity)
    }

    async fn get_document(&self, path: &DocumentPath) -> Result<DocumentSnapshot, BackendError> {
        let url = format!("{FIRESTORE_URL}/{}/{}", self.documents_root(), path);
        let response = self.authorized(self.http.get(url)).await?.send().await.map_err(transport_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(DocumentSnapshot {
                id: path.id.clone(),
                fields: None,
            });
        }
        let raw: RawDocument = read_json(response, service_error).await?;
        Ok(DocumentSnapshot {
            id: path.id.clone(),
            fields: Some(raw.into_document().fields),
        })
    }

    async fn run_query(&self, collection: &CollectionPath, order: &OrderBy) -> Result<Vec<Document>, BackendError> {
        let (parent, collection_id) = collection.parent_and_id();
        let parent = match parent {
            Some(parent) => format!("{}/{}", self.documents_root(), parent),
            None => self.documents_root(),
        };
        let request = self
            .http
            .post(format!("{FIRESTORE_URL}/{parent}:runQuery"))
            .json(&run_query_body(collection_id, order));
        let rows: Vec<QueryRow> = send_json(self.authorized(request).await?, service_error).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.document)
            .map(RawDocument::into_document)
            .collect())
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    BackendError::unavailable(e.to_string())
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    on_error: fn(u16, &str) -> BackendError,
) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(on_error(status.as_u16(), &body));
    }
    response
        .json()
        .await
        .map_err(|e| BackendError::new(crate::error::ErrorCode::Unknown, format!("Unexpected response: {e}")))
}

async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    on_error: fn(u16, &str) -> BackendError,
) -> Result<T, BackendError> {
    let response = request.send().await.map_err(transport_error)?;
    read_json(response, on_error).await
}

impl IdentityBackend for HostedBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        self.inner.credentials("signInWithPassword", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        self.inner.credentials("signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let listeners = self.inner.lock_auth().replace(None);
        notify(listeners, None);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.inner.lock_auth().current()
    }

    fn subscribe_auth_state(
        &self,
        listener: impl Fn(Option<Identity>) + Send + Sync + 'static,
    ) -> Subscription {
        let active = ActiveFlag::new();
        let listener: AuthListener = Arc::new(listener);
        let (id, current) = {
            let mut auth = self.inner.lock_auth();
            auth.next_slot += 1;
            let id = auth.next_slot;
            auth.listeners.insert(id, (active.clone(), listener.clone()));
            (id, auth.current())
        };
        notify(vec![(active.clone(), listener)], current);

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(active, move || {
            if let Some(inner) = inner.upgrade() {
                inner.lock_auth().listeners.remove(&id);
            }
        })
    }
}

impl DocumentStore for HostedBackend {
    async fn create_document(
        &self,
        collection: &CollectionPath,
        doc: NewDocument,
    ) -> Result<CreatedDocument, BackendError> {
        let path = collection.doc(&uuid::Uuid::new_v4().simple().to_string());
        let root = self.inner.documents_root();
        let request = self
            .inner
            .http
            .post(format!("{FIRESTORE_URL}/{root}:commit"))
            .json(&commit_body(&format!("{root}/{path}"), &doc));
        let response: CommitResponse =
            send_json(self.inner.authorized(request).await?, service_error).await?;

        let server_time = response.server_time().ok_or_else(|| {
            BackendError::new(crate::error::ErrorCode::Unknown, "Commit returned no timestamp")
        })?;
        tracing::debug!("Committed {}", path);
        Ok(CreatedDocument { path, server_time })
    }

    async fn get_all(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
    ) -> Result<Vec<Document>, BackendError> {
        self.inner.run_query(collection, order).await
    }

    fn subscribe_document(
        &self,
        path: &DocumentPath,
        listener: impl Fn(Result<DocumentSnapshot, BackendError>) + Send + Sync + 'static,
    ) -> Subscription {
        let inner = self.inner.clone();
        let path = path.clone();
        self.poll(
            move || {
                let inner = inner.clone();
                let path = path.clone();
                async move { inner.get_document(&path).await }
            },
            listener,
        )
    }

    fn subscribe_collection(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
        listener: impl Fn(Result<Vec<Document>, BackendError>) + Send + Sync + 'static,
    ) -> Subscription {
        let inner = self.inner.clone();
        let collection = collection.clone();
        let order = order.clone();
        self.poll(
            move || {
                let inner = inner.clone();
                let collection = collection.clone();
                let order = order.clone();
                async move { inner.run_query(&collection, &order).await }
            },
            listener,
        )
    }
}

impl BlobStore for HostedBackend {
    async fn put_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BackendError> {
        let size = bytes.len();
        let request = self
            .inner
            .http
            .post(format!("{}/o", self.inner.bucket_url()))
            .query(&[("name", path)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        let _: ObjectMetadata = send_json(self.inner.authorized(request).await?, service_error).await?;
        tracing::debug!("Uploaded {} bytes to {}", size, path);
        Ok(())
    }

    async fn public_url(&self, path: &str) -> Result<String, BackendError> {
        let object_url = format!("{}/o/{}", self.inner.bucket_url(), encode_object_path(path));
        let request = self.inner.http.get(&object_url);
        let metadata: ObjectMetadata = send_json(self.inner.authorized(request).await?, service_error).await?;
        let token = metadata
            .first_token()
            .ok_or_else(|| BackendError::not_found(format!("No download token for {path}")))?;
        Ok(format!("{object_url}?alt=media&token={token}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> HostedProject {
        HostedProject {
            project_id: "postboard-test".to_string(),
            api_key: "key".to_string(),
            storage_bucket: "postboard-test.appspot.com".to_string(),
            poll_interval_ms: 2000,
        }
    }

    #[test]
    fn resource_names_follow_the_project() {
        let backend = HostedBackend::new(project());
        assert_eq!(
            backend.inner.documents_root(),
            "projects/postboard-test/databases/(default)/documents"
        );
        assert_eq!(
            backend.inner.bucket_url(),
            "https://firebasestorage.googleapis.com/v0/b/postboard-test.appspot.com"
        );
    }

    #[tokio::test]
    async fn test_auth_listener_sees_sign_out_only_on_change() {
        let backend = HostedBackend::new(project());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = backend.subscribe_auth_state(move |identity| sink.lock().unwrap().push(identity));

        backend.sign_out().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![None]);
        assert_eq!(backend.current_identity(), None);

        let listeners = backend.inner.lock_auth().replace(Some(AuthSession::new(
            Identity::new("u1", None),
            "id".to_string(),
            "refresh".to_string(),
            "3600",
        )));
        notify(listeners, backend.current_identity());
        assert_eq!(backend.current_identity().unwrap().id, "u1");
        assert_eq!(backend.inner.bearer().await.unwrap().as_deref(), Some("id"));

        backend.sign_out().await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some(Identity::new("u1", None)), None]
        );
    }

    #[tokio::test]
    async fn test_cancelled_poll_never_delivers() {
        let backend = HostedBackend::new(project());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut sub = backend.poll(
            || async { Ok::<_, BackendError>(1u8) },
            move |result| sink.lock().unwrap().push(result),
        );
        sub.cancel();
        tokio::task::yield_now().await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
