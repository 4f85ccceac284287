//! Session state: sign-up, sign-in, sign-out and change subscription.

use std::sync::Arc;

use komorebi_core::{Email, EmailError, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;

use crate::error::{clear_sentry_user, set_sentry_user};
use crate::gateway::{GatewayError, RemoteGateway};

/// Minimum password length accepted by the auth backend.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Wrong password or unknown account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Account already registered.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Account created, but the email must be confirmed before signing in.
    #[error("check your inbox to confirm your email")]
    ConfirmationRequired,

    /// Backend failure unrelated to the credentials.
    #[error("auth backend error: {0}")]
    Gateway(#[from] GatewayError),
}

/// The signed-in user as seen by the rest of the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub user_id: UserId,
    pub email: Email,
}

/// Current session, broadcast to subscribers on every change.
#[derive(Clone)]
pub struct AuthState {
    inner: Arc<watch::Sender<Option<SessionUser>>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(tx),
        }
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::WeakPassword` before
    /// any remote call, `AuthError::UserAlreadyExists` if the email is taken,
    /// and `AuthError::ConfirmationRequired` if the backend wants the email
    /// confirmed first.
    #[instrument(skip(self, gateway, password))]
    pub async fn sign_up<G: RemoteGateway>(
        &self,
        gateway: &G,
        email: &str,
        password: &SecretString,
    ) -> Result<SessionUser, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password.expose_secret())?;

        let session = gateway
            .sign_up(&email, password)
            .await
            .map_err(|e| match e {
                GatewayError::Conflict(_) => AuthError::UserAlreadyExists,
                GatewayError::ConfirmationRequired => AuthError::ConfirmationRequired,
                other => AuthError::Gateway(other),
            })?;

        tracing::info!(user_id = %session.user_id, "Signed up");
        Ok(self.start(session.user_id, session.email))
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the backend rejects them.
    #[instrument(skip(self, gateway, password))]
    pub async fn sign_in<G: RemoteGateway>(
        &self,
        gateway: &G,
        email: &str,
        password: &SecretString,
    ) -> Result<SessionUser, AuthError> {
        let email = Email::parse(email)?;

        let session = gateway
            .sign_in(&email, password)
            .await
            .map_err(|e| match e {
                GatewayError::Unauthorized(_) | GatewayError::NotFound(_) => {
                    AuthError::InvalidCredentials
                }
                other => AuthError::Gateway(other),
            })?;

        tracing::info!(user_id = %session.user_id, "Signed in");
        Ok(self.start(session.user_id, session.email))
    }

    /// End the session. Local state is cleared even if the remote call fails.
    #[instrument(skip(self, gateway))]
    pub async fn sign_out<G: RemoteGateway>(&self, gateway: &G) {
        if let Err(e) = gateway.sign_out().await {
            tracing::warn!(error = %e, "Remote sign-out failed");
        }
        clear_sentry_user();
        self.inner.send_replace(None);
        tracing::info!("Signed out");
    }

    fn start(&self, user_id: UserId, email: Email) -> SessionUser {
        set_sentry_user(&user_id, Some(email.as_str()));
        let user = SessionUser { user_id, email };
        self.inner.send_replace(Some(user.clone()));
        user
    }

    #[must_use]
    pub fn current_user(&self) -> Option<SessionUser> {
        self.inner.borrow().clone()
    }

    #[must_use]
    pub fn current_user_id(&self) -> Option<UserId> {
        self.inner.borrow().as_ref().map(|u| u.user_id.clone())
    }

    /// Receive every session change from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionUser>> {
        self.inner.subscribe()
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("user", &self.current_user())
            .finish()
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let gateway = InMemoryGateway::new();
        let auth = AuthState::new();
        let mut changes = auth.subscribe();

        let user = auth
            .sign_up(&gateway, "yuki@komorebi.jp", &secret("sakura-22"))
            .await
            .unwrap();
        assert!(changes.has_changed().unwrap());
        assert_eq!(changes.borrow_and_update().as_ref(), Some(&user));

        auth.sign_out(&gateway).await;
        assert_eq!(auth.current_user(), None);

        let again = auth
            .sign_in(&gateway, "yuki@komorebi.jp", &secret("sakura-22"))
            .await
            .unwrap();
        assert_eq!(again.user_id, user.user_id);
        assert_eq!(auth.current_user_id(), Some(user.user_id));
    }

    #[tokio::test]
    async fn test_rejects_weak_password_and_bad_email() {
        let gateway = InMemoryGateway::new();
        let auth = AuthState::new();

        let weak = auth.sign_up(&gateway, "yuki@komorebi.jp", &secret("abc")).await;
        assert!(matches!(weak, Err(AuthError::WeakPassword(_))));

        let bad = auth.sign_up(&gateway, "not-an-email", &secret("sakura-22")).await;
        assert!(matches!(bad, Err(AuthError::InvalidEmail(_))));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_and_wrong_password() {
        let gateway = InMemoryGateway::new();
        let auth = AuthState::new();
        auth.sign_up(&gateway, "yuki@komorebi.jp", &secret("sakura-22"))
            .await
            .unwrap();

        let dup = auth
            .sign_up(&gateway, "yuki@komorebi.jp", &secret("sakura-22"))
            .await;
        assert!(matches!(dup, Err(AuthError::UserAlreadyExists)));

        let wrong = auth
            .sign_in(&gateway, "yuki@komorebi.jp", &secret("wrong-pass"))
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_sign_out_clears_even_when_offline() {
        let gateway = InMemoryGateway::new();
        let auth = AuthState::new();
        auth.sign_up(&gateway, "yuki@komorebi.jp", &secret("sakura-22"))
            .await
            .unwrap();

        gateway.set_offline(true);
        auth.sign_out(&gateway).await;
        assert!(auth.current_user().is_none());
    }
}
