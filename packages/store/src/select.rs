//! Backend chosen at startup from [`PostboardConfig`].
//!
//! A configured hosted project gets the [`HostedBackend`]; otherwise the app
//! runs on the in-process [`MemoryBackend`], which keeps nothing across
//! restarts.

use crate::backend::{
    BlobStore, CreatedDocument, Document, DocumentSnapshot, DocumentStore, IdentityBackend, NewDocument,
};
use crate::config::PostboardConfig;
use crate::error::BackendError;
use crate::hosted::HostedBackend;
use crate::memory::MemoryBackend;
use crate::models::Identity;
use crate::schema::{CollectionPath, DocumentPath, OrderBy};
use crate::subscription::Subscription;

#[derive(Clone, Debug)]
pub enum AppBackend {
    Hosted(HostedBackend),
    Memory(MemoryBackend),
}

impl AppBackend {
    pub fn from_config(config: &PostboardConfig) -> Self {
        match config.hosted.project() {
            Some(project) => AppBackend::Hosted(HostedBackend::new(project)),
            None => {
                tracing::warn!("No hosted project configured, data is kept in memory only");
                AppBackend::Memory(MemoryBackend::with_public_url_base(
                    config.storage.public_url_base.clone(),
                ))
            }
        }
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self, AppBackend::Hosted(_))
    }
}

impl IdentityBackend for AppBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        match self {
            AppBackend::Hosted(b) => b.sign_in(email, password).await,
            AppBackend::Memory(b) => b.sign_in(email, password).await,
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        match self {
            AppBackend::Hosted(b) => b.sign_up(email, password).await,
            AppBackend::Memory(b) => b.sign_up(email, password).await,
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        match self {
            AppBackend::Hosted(b) => b.sign_out().await,
            AppBackend::Memory(b) => b.sign_out().await,
        }
    }

    fn current_identity(&self) -> Option<Identity> {
        match self {
            AppBackend::Hosted(b) => b.current_identity(),
            AppBackend::Memory(b) => b.current_identity(),
        }
    }

    fn subscribe_auth_state(
        &self,
        listener: impl Fn(Option<Identity>) + Send + Sync + 'static,
    ) -> Subscription {
        match self {
            AppBackend::Hosted(b) => b.subscribe_auth_state(listener),
            AppBackend::Memory(b) => b.subscribe_auth_state(listener),
        }
    }
}

impl DocumentStore for AppBackend {
    async fn create_document(
        &self,
        collection: &CollectionPath,
        doc: NewDocument,
    ) -> Result<CreatedDocument, BackendError> {
        match self {
            AppBackend::Hosted(b) => b.create_document(collection, doc).await,
            AppBackend::Memory(b) => b.create_document(collection, doc).await,
        }
    }

    async fn get_all(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
    ) -> Result<Vec<Document>, BackendError> {
        match self {
            AppBackend::Hosted(b) => b.get_all(collection, order).await,
            AppBackend::Memory(b) => b.get_all(collection, order).await,
        }
    }

    fn subscribe_document(
        &self,
        path: &DocumentPath,
        listener: impl Fn(Result<DocumentSnapshot, BackendError>) + Send + Sync + 'static,
    ) -> Subscription {
        match self {
            AppBackend::Hosted(b) => b.subscribe_document(path, listener),
            AppBackend::Memory(b) => b.subscribe_document(path, listener),
        }
    }

    fn subscribe_collection(
        &self,
        collection: &CollectionPath,
        order: &OrderBy,
        listener: impl Fn(Result<Vec<Document>, BackendError>) + Send + Sync + 'static,
    ) -> Subscription {
        match self {
            AppBackend::Hosted(b) => b.subscribe_collection(collection, order, listener),
            AppBackend::Memory(b) => b.subscribe_collection(collection, order, listener),
        }
    }
}

impl BlobStore for AppBackend {
    async fn put_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BackendError> {
        match self {
            AppBackend::Hosted(b) => b.put_object(path, bytes, content_type).await,
            AppBackend::Memory(b) => b.put_object(path, bytes, content_type).await,
        }
    }

    async fn public_url(&self, path: &str) -> Result<String, BackendError> {
        match self {
            AppBackend::Hosted(b) => b.public_url(path).await,
            AppBackend::Memory(b) => b.public_url(path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_project_runs_in_memory() {
        let config = PostboardConfig::default().with_public_url_base("https://cdn.test");
        let backend = AppBackend::from_config(&config);
        assert!(!backend.is_hosted());
    }

    #[test]
    fn configured_project_is_hosted() {
        let config = PostboardConfig::default().with_hosted_project("p", "key", "p.appspot.com");
        assert!(AppBackend::from_config(&config).is_hosted());
    }

    #[tokio::test]
    async fn test_memory_variant_delegates() {
        let backend = AppBackend::from_config(&PostboardConfig::default());
        let identity = backend.sign_up("ann@example.com", "hunter22").await.unwrap();
        assert_eq!(backend.current_identity(), Some(identity));

        let created = backend
            .create_document(&CollectionPath::posts(), NewDocument::new().set("title", "t"))
            .await
            .unwrap();
        let docs = backend
            .get_all(&CollectionPath::posts(), &OrderBy::asc("title"))
            .await
            .unwrap();
        assert_eq!(docs[0].id, created.path.id);
    }
}
