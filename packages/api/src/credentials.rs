//! Sign-in, sign-up and sign-out.
//!
//! Fire-and-report: each call either returns a [`Notice`] acknowledging
//! success or an [`AppError`] naming the cause. The new identity is not
//! returned; the [`crate::SessionProvider`] observes it through its
//! subscription.

use store::IdentityBackend;

use crate::error::{AppError, Notice};

#[derive(Clone, Debug)]
pub struct CredentialGateway<B> {
    backend: B,
}

impl<B: IdentityBackend> CredentialGateway<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Notice, AppError> {
        let email = email.trim();
        match self.backend.sign_in(email, password).await {
            Ok(identity) => {
                tracing::info!("Signed in as {}", identity.display_name());
                Ok(Notice::new("Signed in", "Welcome back!"))
            }
            Err(e) => {
                tracing::warn!("Sign-in failed for {}: {}", email, e);
                Err(AppError::from_auth(e))
            }
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Notice, AppError> {
        let email = email.trim();
        match self.backend.sign_up(email, password).await {
            Ok(identity) => {
                tracing::info!("Registered {}", identity.display_name());
                Ok(Notice::new("Registered", "Your account has been created."))
            }
            Err(e) => {
                tracing::warn!("Sign-up failed for {}: {}", email, e);
                Err(AppError::from_auth(e))
            }
        }
    }

    pub async fn sign_out(&self) -> Result<Notice, AppError> {
        match self.backend.sign_out().await {
            Ok(()) => Ok(Notice::new("Signed out", "You have been signed out.")),
            Err(e) => {
                tracing::error!("Sign-out failed: {}", e);
                Err(AppError::from_auth(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ScreenSet, SessionProvider};
    use store::{BackendCall, BackendError, MemoryBackend};

    async fn registered() -> (MemoryBackend, CredentialGateway<MemoryBackend>) {
        let backend = MemoryBackend::new();
        let gateway = CredentialGateway::new(backend.clone());
        gateway.sign_up("ann@example.com", "secret1").await.unwrap();
        gateway.sign_out().await.unwrap();
        (backend, gateway)
    }

    #[tokio::test]
    async fn test_wrong_password_leaves_session_absent() {
        let (backend, gateway) = registered().await;
        let provider = SessionProvider::start(&backend);

        let err = gateway.sign_in("ann@example.com", "bad-password").await.unwrap_err();
        assert!(matches!(err, AppError::WrongPassword | AppError::InvalidCredentials));
        assert!(provider.state().identity.is_none());
        assert_eq!(provider.state().screen_set(), ScreenSet::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_in_is_observed_by_the_provider() {
        let (backend, gateway) = registered().await;
        let provider = SessionProvider::start(&backend);

        let notice = gateway.sign_in("  ann@example.com ", "secret1").await.unwrap();
        assert_eq!(notice.title, "Signed in");
        assert_eq!(
            provider.state().identity.and_then(|i| i.email).as_deref(),
            Some("ann@example.com")
        );

        gateway.sign_out().await.unwrap();
        assert_eq!(provider.state().screen_set(), ScreenSet::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_up_errors_are_translated() {
        let (_backend, gateway) = registered().await;
        assert_eq!(
            gateway.sign_up("ann@example.com", "secret2").await,
            Err(AppError::EmailAlreadyInUse)
        );
        assert!(matches!(
            gateway.sign_up("bob@example.com", "123").await,
            Err(AppError::WeakPassword(_))
        ));
        assert_eq!(
            gateway.sign_in("nobody@example.com", "secret1").await,
            Err(AppError::UserNotFound)
        );
    }

    #[tokio::test]
    async fn test_no_automatic_retry() {
        let (backend, gateway) = registered().await;
        backend.fail_on(BackendCall::SignIn, BackendError::unavailable("network down"));

        let err = gateway.sign_in("ann@example.com", "secret1").await.unwrap_err();
        assert_eq!(err, AppError::BackendUnavailable("network down".to_string()));
        assert_eq!(backend.call_count(BackendCall::SignIn), 1);
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let (_backend, gateway) = registered().await;
        for _ in 0..5 {
            let _ = gateway.sign_in("ann@example.com", "wrong").await;
        }
        assert_eq!(
            gateway.sign_in("ann@example.com", "secret1").await,
            Err(AppError::RateLimited)
        );
    }
}
