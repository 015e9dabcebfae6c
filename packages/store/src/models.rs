//! # Domain models for posts, comments and identities
//!
//! These are the typed views of the documents the hosted backend stores. The
//! backend speaks in loosely typed field maps ([`crate::backend::Fields`]); the
//! `from_document` constructors turn a [`Document`] into a [`Post`] or
//! [`Comment`] using the field names from [`crate::schema`].
//!
//! ## Types
//!
//! | Struct | Represents |
//! |--------|-----------|
//! | [`Identity`] | The signed-in user's opaque handle. Held in memory only. |
//! | [`Post`] | A user-authored record with optional image URL. |
//! | [`Comment`] | A reply stored under `posts/{postId}/comments`. |
//! | [`CreatedAt`] | The `createdAt` field as it may appear on the wire: a server timestamp object, epoch milliseconds, a string, or anything else (rendered blank). |
//!
//! `created_at` is an `Option` everywhere because a freshly written document can
//! reach a live listener before the backend has filled in its server timestamp.
//! [`format_created_at`] renders that case (and anything unparseable) as an
//! empty string.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::Document;

/// The authenticated user for the current session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
        }
    }

    /// Email if known, otherwise the raw id.
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }
}

/// A timestamp assigned by the backend at write time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerTimestamp {
    #[serde(alias = "_seconds")]
    pub seconds: i64,
    #[serde(default, alias = "nanoseconds", alias = "_nanoseconds")]
    pub nanos: u32,
}

impl ServerTimestamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            seconds: at.timestamp(),
            nanos: at.timestamp_subsec_nanos(),
        }
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos)
    }

    /// The smallest timestamp strictly after `self`.
    pub fn next_tick(&self) -> Self {
        if self.nanos >= 999_999_999 {
            Self {
                seconds: self.seconds + 1,
                nanos: 0,
            }
        } else {
            Self {
                seconds: self.seconds,
                nanos: self.nanos + 1,
            }
        }
    }
}

/// Every shape the `createdAt` field is read back in.
///
/// Decoding never fails: a value none of the known shapes match lands in
/// [`CreatedAt::Other`] so the surrounding document still reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreatedAt {
    /// Backend timestamp object: `{"seconds": .., "nanos": ..}`, also
    /// accepted with `nanoseconds` or underscore-prefixed keys.
    Server(ServerTimestamp),
    /// Plain epoch milliseconds.
    Millis(i64),
    /// Epoch milliseconds written as a float.
    FractionalMillis(f64),
    /// RFC 3339 or `YYYY-MM-DD HH:MM[:SS]` text.
    Text(String),
    Other(serde_json::Value),
}

impl CreatedAt {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            CreatedAt::Server(ts) => ts.to_datetime(),
            CreatedAt::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            CreatedAt::FractionalMillis(ms) if ms.is_finite() => {
                DateTime::from_timestamp_millis(ms.round() as i64)
            }
            CreatedAt::FractionalMillis(_) => None,
            CreatedAt::Text(text) => parse_text_timestamp(text),
            CreatedAt::Other(_) => None,
        }
    }
}

fn parse_text_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(ms) = text.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms);
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Render a creation time as `YYYY-MM-DD HH:MM` (UTC).
///
/// Returns an empty string when the timestamp has not been echoed back yet or
/// cannot be interpreted.
pub fn format_created_at(created_at: Option<&CreatedAt>) -> String {
    created_at
        .and_then(CreatedAt::to_datetime)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Field layout of a `posts` document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostFields {
    title: String,
    content: String,
    #[serde(default)]
    image_url: Option<String>,
    user_id: String,
    #[serde(default)]
    created_at: Option<CreatedAt>,
}

/// A post as read from the `posts` collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub author_id: String,
    pub created_at: Option<CreatedAt>,
}

impl Post {
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        let fields: PostFields =
            serde_json::from_value(serde_json::Value::Object(doc.fields.clone()))?;
        Ok(Self {
            id: doc.id.clone(),
            title: fields.title,
            content: fields.content,
            image_url: fields.image_url,
            author_id: fields.user_id,
            created_at: fields.created_at,
        })
    }

    /// Formatted creation time, empty until the server timestamp is known.
    pub fn created_label(&self) -> String {
        format_created_at(self.created_at.as_ref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentFields {
    content: String,
    user_id: String,
    #[serde(default)]
    created_at: Option<CreatedAt>,
}

/// A comment as read from `posts/{postId}/comments`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub created_at: Option<CreatedAt>,
}

impl Comment {
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        let fields: CommentFields =
            serde_json::from_value(serde_json::Value::Object(doc.fields.clone()))?;
        Ok(Self {
            id: doc.id.clone(),
            content: fields.content,
            author_id: fields.user_id,
            created_at: fields.created_at,
        })
    }

    pub fn created_label(&self) -> String {
        format_created_at(self.created_at.as_ref())
    }
}

/// Decode every document of a snapshot, skipping the ones that do not parse.
pub fn decode_all<T>(
    docs: &[Document],
    decode: impl Fn(&Document) -> Result<T, serde_json::Error>,
) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match decode(doc) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping malformed document {}: {}", doc.id, e);
                None
            }
        })
        .collect()
}

/// A device-local image handle, valid only until the post is submitted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalImage {
    pub uri: String,
}

impl LocalImage {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}
