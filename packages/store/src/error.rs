//! Errors reported by the hosted backend.
//!
//! The backend identifies failures with string codes such as
//! `auth/wrong-password` or `storage/unauthorized`. [`ErrorCode`] is the typed
//! form of those codes; callers above the store map them to user-facing
//! messages.

use std::fmt;

/// Error codes the backend can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidCredential,
    InvalidEmail,
    UserNotFound,
    WrongPassword,
    TooManyRequests,
    EmailAlreadyInUse,
    WeakPassword,
    PermissionDenied,
    NotFound,
    Unavailable,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidCredential => "auth/invalid-credential",
            ErrorCode::InvalidEmail => "auth/invalid-email",
            ErrorCode::UserNotFound => "auth/user-not-found",
            ErrorCode::WrongPassword => "auth/wrong-password",
            ErrorCode::TooManyRequests => "auth/too-many-requests",
            ErrorCode::EmailAlreadyInUse => "auth/email-already-in-use",
            ErrorCode::WeakPassword => "auth/weak-password",
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::NotFound => "not-found",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Unknown => "unknown",
        }
    }

    /// Parse a backend code string. Unrecognised codes map to [`ErrorCode::Unknown`].
    pub fn parse(code: &str) -> Self {
        match code {
            "auth/invalid-credential" | "auth/invalid-login-credentials" => {
                ErrorCode::InvalidCredential
            }
            "auth/invalid-email" => ErrorCode::InvalidEmail,
            "auth/user-not-found" => ErrorCode::UserNotFound,
            "auth/wrong-password" => ErrorCode::WrongPassword,
            "auth/too-many-requests" => ErrorCode::TooManyRequests,
            "auth/email-already-in-use" => ErrorCode::EmailAlreadyInUse,
            "auth/weak-password" => ErrorCode::WeakPassword,
            "permission-denied" | "storage/unauthorized" => ErrorCode::PermissionDenied,
            "not-found" | "storage/object-not-found" => ErrorCode::NotFound,
            "unavailable" | "auth/network-request-failed" | "storage/retry-limit-exceeded" => {
                ErrorCode::Unavailable
            }
            _ => ErrorCode::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed backend call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct BackendError {
    pub code: ErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_their_strings() {
        for code in [
            ErrorCode::InvalidCredential,
            ErrorCode::UserNotFound,
            ErrorCode::WrongPassword,
            ErrorCode::TooManyRequests,
            ErrorCode::EmailAlreadyInUse,
            ErrorCode::WeakPassword,
            ErrorCode::Unavailable,
        ] {
            assert_eq!(ErrorCode::parse(code.as_str()), code);
        }
    }

    #[test]
    fn unknown_and_aliased_codes() {
        assert_eq!(ErrorCode::parse("auth/something-new"), ErrorCode::Unknown);
        assert_eq!(
            ErrorCode::parse("auth/invalid-login-credentials"),
            ErrorCode::InvalidCredential
        );
        assert_eq!(
            ErrorCode::parse("storage/unauthorized"),
            ErrorCode::PermissionDenied
        );
    }

    #[test]
    fn display_includes_code() {
        let err = BackendError::new(ErrorCode::WrongPassword, "Wrong password");
        assert_eq!(err.to_string(), "Wrong password (auth/wrong-password)");
    }
}
