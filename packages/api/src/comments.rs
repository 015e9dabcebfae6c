//! Appending comments to a post.
//!
//! Submission only writes. The new comment reaches the screen through the
//! detail synchronizer's live subscription, never by local insertion.

use serde::{Deserialize, Serialize};
use store::schema::fields;
use store::{CollectionPath, DocumentStore, NewDocument};

use crate::busy::InFlight;
use crate::error::AppError;
use crate::session::Session;

/// Text in the comment input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub text: String,
}

impl CommentDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

pub struct CommentSubmission<S> {
    store: S,
    session: Session,
    flight: InFlight,
}

impl<S: DocumentStore> CommentSubmission<S> {
    pub fn new(store: S, session: Session) -> Self {
        Self {
            store,
            session,
            flight: InFlight::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.flight.is_pending()
    }

    /// Returns the new comment's id and clears `draft`.
    pub async fn submit_comment(&self, post_id: &str, draft: &mut CommentDraft) -> Result<String, AppError> {
        let identity = self.session.require_identity()?;
        let text = draft.text.trim();
        if text.is_empty() {
            return Err(AppError::ValidationFailed("Please enter a comment".to_string()));
        }
        let _guard = self.flight.begin()?;

        let doc = NewDocument::new()
            .set(fields::CONTENT, text)
            .set(fields::USER_ID, identity.id.as_str())
            .server_timestamp(fields::CREATED_AT);
        let created = self
            .store
            .create_document(&CollectionPath::comments_of(post_id), doc)
            .await
            .map_err(|e| {
                tracing::error!("Failed to add comment to {}: {}", post_id, e);
                AppError::SubmissionFailed(e.message)
            })?;

        tracing::debug!("Added comment {}", created.path);
        draft.clear();
        Ok(created.path.id)
    }
}
