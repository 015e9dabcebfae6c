//! # API crate: the client workflows of Postboard
//!
//! Every operation the screens trigger lives here, written against the port
//! traits of the `store` crate so the same code runs on the hosted backend or
//! on [`store::MemoryBackend`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`session`] | `SessionProvider`: single writer of the signed-in identity, splash/auth/unauth screen gating |
//! | [`credentials`] | `CredentialGateway`: sign-in, sign-up, sign-out with translated errors |
//! | [`feed`] | `FeedLoader`: newest-first post list, "not loaded" vs "empty" |
//! | [`media`] | Permission-checked image picking and best-effort JPEG normalisation |
//! | [`submit`] | `PostSubmission`: validate, upload image, create post |
//! | [`detail`] | `PostDetailSync`: live post + comments for a mounted detail screen |
//! | [`comments`] | `CommentSubmission`: append a comment |
//! | [`error`] | `AppError` taxonomy and user-facing `Notice` |
//!
//! Nothing in this crate retries. Preconditions fail before any backend call;
//! backend failures are logged with `tracing` and returned once.

pub mod busy;
pub mod comments;
pub mod credentials;
pub mod detail;
pub mod error;
pub mod feed;
pub mod media;
pub mod session;
pub mod submit;

pub use comments::{CommentDraft, CommentSubmission};
pub use credentials::CredentialGateway;
pub use detail::{DetailEvent, DetailPhase, DetailSnapshot, PostDetailSync};
pub use error::{AppError, Notice};
pub use feed::{FeedLoader, FeedState};
pub use media::{normalize_image, pick_image, NormalizedImage};
pub use session::{ScreenSet, Session, SessionProvider, SessionState};
pub use submit::{PostForm, PostSubmission};

pub use store::{Comment, Identity, LocalImage, Post, PostboardConfig};
