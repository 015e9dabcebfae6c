//! # Error taxonomy and user notifications
//!
//! Every workflow returns [`AppError`]. Preconditions (`NotAuthenticated`,
//! `ValidationFailed`, `Busy`) are raised before any backend call. Backend
//! failures are translated from their [`ErrorCode`] into the variant that
//! names the likely cause; nothing is retried.
//!
//! [`Notice`] is what the UI shows: a short title plus a human-readable message.

use serde::{Deserialize, Serialize};
use store::{BackendError, ErrorCode};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    #[error("You need to sign in first")]
    NotAuthenticated,

    #[error("{0}")]
    ValidationFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Image upload failed: {0}")]
    UploadFailed(String),

    #[error("Could not save: {0}")]
    SubmissionFailed(String),

    #[error("The post could not be found")]
    NotFound,

    #[error("A submission is already in progress")]
    Busy,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No account exists for this email")]
    UserNotFound,

    #[error("Wrong password")]
    WrongPassword,

    #[error("Too many attempts, try again later")]
    RateLimited,

    #[error("An account with this email already exists")]
    EmailAlreadyInUse,

    #[error("{0}")]
    WeakPassword(String),

    #[error("The email address is not valid")]
    InvalidEmail,

    #[error("Service unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{0}")]
    Unknown(String),
}

impl AppError {
    /// Map an identity backend failure.
    pub fn from_auth(err: BackendError) -> Self {
        match err.code {
            ErrorCode::InvalidCredential => AppError::InvalidCredentials,
            ErrorCode::UserNotFound => AppError::UserNotFound,
            ErrorCode::WrongPassword => AppError::WrongPassword,
            ErrorCode::TooManyRequests => AppError::RateLimited,
            ErrorCode::EmailAlreadyInUse => AppError::EmailAlreadyInUse,
            ErrorCode::WeakPassword => AppError::WeakPassword(err.message),
            ErrorCode::InvalidEmail => AppError::InvalidEmail,
            _ => AppError::from_backend(err),
        }
    }

    /// Map a document or storage failure that has no workflow-specific meaning.
    pub fn from_backend(err: BackendError) -> Self {
        match err.code {
            ErrorCode::Unavailable => AppError::BackendUnavailable(err.message),
            ErrorCode::PermissionDenied => AppError::PermissionDenied(err.message),
            ErrorCode::NotFound => AppError::NotFound,
            _ => AppError::Unknown(err.message),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AppError::NotAuthenticated => "Sign-in required",
            AppError::ValidationFailed(_) => "Input error",
            AppError::PermissionDenied(_) => "Permission required",
            AppError::UploadFailed(_) | AppError::SubmissionFailed(_) => "Submission failed",
            AppError::NotFound => "Not found",
            AppError::Busy => "Please wait",
            AppError::InvalidCredentials
            | AppError::UserNotFound
            | AppError::WrongPassword
            | AppError::RateLimited
            | AppError::EmailAlreadyInUse
            | AppError::WeakPassword(_)
            | AppError::InvalidEmail => "Authentication failed",
            AppError::BackendUnavailable(_) => "Connection problem",
            AppError::Unknown(_) => "Error",
        }
    }

    pub fn notice(&self) -> Notice {
        Notice {
            title: self.title().to_string(),
            message: self.to_string(),
        }
    }
}

/// A discrete message for the user: an alert or a toast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}
