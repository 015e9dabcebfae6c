//! # Session state
//!
//! [`SessionProvider`] is the single writer of "who is signed in". It subscribes
//! once to the identity backend's auth-state stream on [`start`](SessionProvider::start)
//! and republishes every emission on a `tokio::sync::watch` channel. Everything
//! else reads through a cloneable [`Session`].
//!
//! Until the first emission arrives the state is `loading`, and
//! [`SessionState::screen_set`] answers [`ScreenSet::Splash`] so the root
//! navigator mounts neither the signed-in nor the signed-out screens.

use serde::{Deserialize, Serialize};
use store::{IdentityBackend, Identity, Subscription};
use tokio::sync::watch;

use crate::error::AppError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            identity: None,
            loading: true,
        }
    }
}

/// Which screens the root navigator mounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreenSet {
    Splash,
    Authenticated,
    Unauthenticated,
}

impl SessionState {
    pub fn screen_set(&self) -> ScreenSet {
        match (self.loading, &self.identity) {
            (true, _) => ScreenSet::Splash,
            (false, Some(_)) => ScreenSet::Authenticated,
            (false, None) => ScreenSet::Unauthenticated,
        }
    }
}

/// Read-only view of the session.
#[derive(Clone, Debug)]
pub struct Session {
    rx: watch::Receiver<SessionState>,
}

impl Session {
    /// A session pinned to `identity`, detached from any backend.
    pub fn fixed(identity: Option<Identity>) -> Self {
        let (_tx, rx) = watch::channel(SessionState {
            identity,
            loading: false,
        });
        Self { rx }
    }

    pub fn state(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.rx.borrow().identity.clone()
    }

    pub fn require_identity(&self) -> Result<Identity, AppError> {
        self.identity().ok_or(AppError::NotAuthenticated)
    }

    /// Receiver that wakes on every session change.
    pub fn changes(&self) -> watch::Receiver<SessionState> {
        self.rx.clone()
    }

    /// Wait for the first auth-state emission.
    pub async fn ready(&self) -> SessionState {
        let mut rx = self.rx.clone();
        if let Ok(state) = rx.wait_for(|state| !state.loading).await {
            return state.clone();
        }
        // Provider gone before the first emission.
        let state = rx.borrow().clone();
        state
    }
}

/// Owner of the auth-state subscription.
pub struct SessionProvider {
    rx: watch::Receiver<SessionState>,
    subscription: Subscription,
}

impl SessionProvider {
    pub fn start<B: IdentityBackend>(backend: &B) -> Self {
        let (tx, rx) = watch::channel(SessionState::default());
        let subscription = backend.subscribe_auth_state(move |identity| {
            match &identity {
                Some(who) => tracing::info!("Session active for {}", who.display_name()),
                None => tracing::info!("No active session"),
            }
            tx.send_replace(SessionState {
                identity,
                loading: false,
            });
        });
        Self { rx, subscription }
    }

    pub fn session(&self) -> Session {
        Session {
            rx: self.rx.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stop listening. Safe to call more than once; the last state is kept.
    pub fn shutdown(&mut self) {
        if self.subscription.is_active() {
            tracing::debug!("Session provider shutting down");
        }
        self.subscription.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::MemoryBackend;

    #[tokio::test]
    async fn test_initial_state_is_loading() {
        let state = SessionState::default();
        assert!(state.loading);
        assert!(state.identity.is_none());
        assert_eq!(state.screen_set(), ScreenSet::Splash);
    }

    #[tokio::test]
    async fn test_provider_tracks_sign_in_and_out() {
        let backend = MemoryBackend::new();
        let provider = SessionProvider::start(&backend);
        let session = provider.session();

        let state = session.ready().await;
        assert_eq!(state.screen_set(), ScreenSet::Unauthenticated);

        let identity = backend.sign_up("ann@example.com", "secret1").await.unwrap();
        assert_eq!(session.identity(), Some(identity));
        assert_eq!(session.state().screen_set(), ScreenSet::Authenticated);

        backend.sign_out().await.unwrap();
        assert_eq!(session.identity(), None);
        assert_eq!(provider.state().screen_set(), ScreenSet::Unauthenticated);
    }

    #[tokio::test]
    async fn test_restored_session_is_seen_on_start() {
        let backend = MemoryBackend::new();
        let identity = backend.sign_up("ann@example.com", "secret1").await.unwrap();

        let provider = SessionProvider::start(&backend);
        assert_eq!(provider.state().identity, Some(identity));
        assert!(!provider.state().loading);
    }

    #[tokio::test]
    async fn test_changes_receiver_wakes() {
        let backend = MemoryBackend::new();
        let provider = SessionProvider::start(&backend);
        let mut changes = provider.session().changes();
        changes.borrow_and_update();

        backend.sign_up("ann@example.com", "secret1").await.unwrap();
        assert!(changes.has_changed().unwrap());
        assert!(changes.borrow_and_update().identity.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_detaches_and_is_idempotent() {
        let backend = MemoryBackend::new();
        let mut provider = SessionProvider::start(&backend);
        assert_eq!(backend.listener_count(), 1);

        provider.shutdown();
        provider.shutdown();
        assert!(!provider.is_running());
        assert_eq!(backend.listener_count(), 0);

        backend.sign_up("ann@example.com", "secret1").await.unwrap();
        assert!(provider.state().identity.is_none());
    }

    #[tokio::test]
    async fn test_fixed_session() {
        let session = Session::fixed(Some(Identity::new("u1", None)));
        assert_eq!(session.require_identity().unwrap().id, "u1");
        assert_eq!(
            Session::fixed(None).require_identity(),
            Err(AppError::NotAuthenticated)
        );
    }
}
