pub mod backend;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod schema;
pub mod subscription;

mod hosted;
mod memory;
mod select;
pub use hosted::HostedBackend;
pub use memory::{BackendCall, MemoryBackend};
pub use select::AppBackend;

mod password;

pub use backend::{
    BlobStore, CreatedDocument, Document, DocumentSnapshot, DocumentStore, Fields, IdentityBackend,
    NewDocument,
};
pub use config::{HostedConfig, HostedProject, PostboardConfig};
pub use error::{BackendError, ErrorCode};
pub use media::{ImageFormat, MediaError, MediaLibrary, MemoryMedia, PermissionStatus, PickOptions};
pub use models::{format_created_at, Comment, CreatedAt, Identity, LocalImage, Post, ServerTimestamp};
pub use schema::{CollectionPath, DocumentPath, OrderBy};
pub use subscription::Subscription;
