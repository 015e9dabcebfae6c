//! Collection paths and field names of the remote document layout.
//!
//! ```text
//! posts/{postId}                 {title, content, imageUrl, userId, createdAt}
//! posts/{postId}/comments/{id}   {content, userId, createdAt}
//! ```
//!
//! Uploaded images live in blob storage under `posts/{userId}/...`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level collection holding every post.
pub const POSTS: &str = "posts";

/// Sub-collection name under each post.
pub const COMMENTS: &str = "comments";

pub mod fields {
    pub const TITLE: &str = "title";
    pub const CONTENT: &str = "content";
    pub const IMAGE_URL: &str = "imageUrl";
    pub const USER_ID: &str = "userId";
    pub const CREATED_AT: &str = "createdAt";
}

/// Slash-separated path of a collection, e.g. `posts/abc/comments`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into().trim_matches('/').to_string())
    }

    pub fn posts() -> Self {
        Self::new(POSTS)
    }

    pub fn comments_of(post_id: &str) -> Self {
        Self(format!("{POSTS}/{post_id}/{COMMENTS}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into the parent document path (if nested) and the collection id:
    /// `posts/abc/comments` gives `(Some("posts/abc"), "comments")`.
    pub fn parent_and_id(&self) -> (Option<&str>, &str) {
        match self.0.rsplit_once('/') {
            Some((parent, id)) => (Some(parent), id),
            None => (None, &self.0),
        }
    }

    pub fn doc(&self, id: &str) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single document inside a collection.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocumentPath {
    pub fn post(post_id: &str) -> Self {
        CollectionPath::posts().doc(post_id)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Sort direction for ordered queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

/// `orderBy(field, direction)`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Descending,
        }
    }

    /// Newest posts first, as the feed shows them.
    pub fn newest_first() -> Self {
        Self::desc(fields::CREATED_AT)
    }

    /// Oldest first, conversation order for comments.
    pub fn oldest_first() -> Self {
        Self::asc(fields::CREATED_AT)
    }
}

/// Blob path for an uploaded post image: `posts/{userId}/{millis}-{suffix}.jpg`.
///
/// The random suffix keeps two uploads from the same author within the same
/// millisecond apart.
pub fn post_image_path(user_id: &str, millis: i64, suffix: &str) -> String {
    format!("{POSTS}/{user_id}/{millis}-{suffix}.jpg")
}

/// Object path as a single URL segment, the way blob download URLs carry it.
pub fn encode_object_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
