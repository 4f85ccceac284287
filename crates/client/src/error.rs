//! Unified error handling with Sentry integration.
//!
//! Provides a unified `ClientError` type for every fallible operation exposed
//! by the stores and services. Remote failures that are not the caller's fault
//! are captured to Sentry via [`ClientError::report`].

use komorebi_core::ListingError;
use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::persistence::PersistenceError;

/// Application-level error type for the client state layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Remote backend call failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Local persistence failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Listing draft failed validation.
    #[error("Invalid listing: {0}")]
    Listing(#[from] ListingError),

    /// Sign-up or sign-in failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Operation requires a signed-in user.
    #[error("Not signed in")]
    NotSignedIn,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad input from the caller.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Capture unexpected failures to Sentry and log them.
    ///
    /// Validation and auth errors are expected and only logged at debug level.
    pub fn report(&self) {
        let unexpected = match self {
            Self::Gateway(e) => e.is_transient() || matches!(e, GatewayError::Parse(_)),
            Self::Auth(AuthError::Gateway(e)) => e.is_transient(),
            Self::Persistence(_) | Self::Internal(_) => true,
            _ => false,
        };

        if unexpected {
            let event_id = sentry::capture_error(self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "Client error");
        } else {
            tracing::debug!(error = %self, "Client error");
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful sign-in to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "p1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    add_breadcrumb_at(sentry::Level::Info, category, message, data);
}

/// Record a failed outbox delivery as a warning breadcrumb.
pub fn record_sync_failure(op: &str, error: &str) {
    add_breadcrumb_at(
        sentry::Level::Warning,
        "sync",
        "Remote cart sync failed",
        Some(&[("op", op), ("error", error)]),
    );
}

fn add_breadcrumb_at(
    level: sentry::Level,
    category: &str,
    message: &str,
    data: Option<&[(&str, &str)]>,
) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::NotFound("product-123".to_string());
        assert_eq!(err.to_string(), "Not found: product-123");

        let err = ClientError::BadRequest("empty comment".to_string());
        assert_eq!(err.to_string(), "Bad request: empty comment");
    }

    #[test]
    fn test_gateway_error_converts() {
        let err: ClientError = GatewayError::Conflict("dup".to_string()).into();
        assert!(matches!(err, ClientError::Gateway(GatewayError::Conflict(_))));
    }

    #[test]
    fn test_report_without_client_is_noop() {
        // No Sentry client is bound in tests; reporting must not panic.
        ClientError::Internal("boom".to_string()).report();
        ClientError::NotSignedIn.report();
        record_sync_failure("op-1", "offline");
    }
}
