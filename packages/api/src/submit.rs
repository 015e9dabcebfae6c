//! # Post submission
//!
//! [`PostSubmission::submit_post`] runs the whole "new post" flow:
//!
//! 1. preconditions: a signed-in identity, non-blank title and content, no
//!    other submission pending. Nothing reaches the backend if one fails;
//! 2. optional image: normalise to JPEG (best effort), read the bytes, upload
//!    them under `posts/{uid}/{millis}-{suffix}.jpg` and resolve a public URL.
//!    Any failure here aborts with [`AppError::UploadFailed`] before a post
//!    exists;
//! 3. create the `posts` document with a server timestamp. A failure here is
//!    [`AppError::SubmissionFailed`].
//!
//! The form is cleared only on success.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use store::schema::{fields, post_image_path};
use store::{
    BlobStore, CollectionPath, CreatedAt, DocumentStore, Identity, ImageFormat, LocalImage,
    MediaLibrary, NewDocument, Post, PostboardConfig,
};

use crate::busy::InFlight;
use crate::error::AppError;
use crate::media::normalize_image;
use crate::session::Session;

/// What the user typed on the new-post screen.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    pub image: Option<LocalImage>,
}

impl PostForm {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: LocalImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

pub struct PostSubmission<B, M> {
    backend: B,
    media: M,
    session: Session,
    jpeg_quality: f32,
    flight: InFlight,
}

impl<B, M> PostSubmission<B, M>
where
    B: DocumentStore + BlobStore,
    M: MediaLibrary,
{
    pub fn new(backend: B, media: M, session: Session, config: &PostboardConfig) -> Self {
        Self {
            backend,
            media,
            session,
            jpeg_quality: config.upload.jpeg_quality,
            flight: InFlight::new(),
        }
    }

    /// Whether a submission is in flight; the submit button is disabled meanwhile.
    pub fn is_pending(&self) -> bool {
        self.flight.is_pending()
    }

    pub async fn submit_post(&self, form: &mut PostForm) -> Result<Post, AppError> {
        let identity = self.session.require_identity()?;
        let title = form.title.trim();
        let content = form.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(AppError::ValidationFailed(
                "Please enter both a title and content".to_string(),
            ));
        }
        let _guard = self.flight.begin()?;

        let image_url = match &form.image {
            Some(image) => Some(self.upload_image(&identity, image).await?),
            None => None,
        };

        let doc = NewDocument::new()
            .set(fields::TITLE, title)
            .set(fields::CONTENT, content)
            .set(fields::IMAGE_URL, image_url.clone())
            .set(fields::USER_ID, identity.id.as_str())
            .server_timestamp(fields::CREATED_AT);

        let created = self
            .backend
            .create_document(&CollectionPath::posts(), doc)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create post: {}", e);
                AppError::SubmissionFailed(e.message)
            })?;
        tracing::info!("Created post {}", created.path);

        let post = Post {
            id: created.path.id,
            title: title.to_string(),
            content: content.to_string(),
            image_url,
            author_id: identity.id,
            created_at: Some(CreatedAt::Server(created.server_time)),
        };
        form.clear();
        Ok(post)
    }

    async fn upload_image(&self, identity: &Identity, image: &LocalImage) -> Result<String, AppError> {
        let normalized = normalize_image(&self.media, image, self.jpeg_quality).await;
        let bytes = self.media.read(normalized.image()).await.map_err(|e| {
            tracing::error!("Could not read {}: {}", normalized.image().uri, e);
            AppError::UploadFailed(e.to_string())
        })?;

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let path = post_image_path(&identity.id, Utc::now().timestamp_millis(), &suffix);
        tracing::debug!("Uploading {} bytes to {}", bytes.len(), path);

        self.backend
            .put_object(&path, bytes, ImageFormat::Jpeg.content_type())
            .await
            .map_err(|e| {
                tracing::error!("Upload to {} failed: {}", path, e);
                AppError::UploadFailed(e.message)
            })?;

        self.backend.public_url(&path).await.map_err(|e| {
            tracing::error!("Could not resolve URL for {}: {}", path, e);
            AppError::UploadFailed(e.message)
        })
    }
}
