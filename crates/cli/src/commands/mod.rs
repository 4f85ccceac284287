//! Subcommand implementations.
//!
//! Every command runs against one [`Context`]: the application state plus the
//! optional signed-in user.

pub mod cart;
pub mod catalog;
pub mod favorites;
pub mod notifications;
pub mod outbox;
pub mod profile;
pub mod sell;

use komorebi_client::{AppState, ClientError, SessionUser, SupabaseClient};
use secrecy::SecretString;

/// Result type shared by every command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Environment variable holding the password for `--email`.
const PASSWORD_ENV: &str = "KOMOREBI_PASSWORD";

/// Application state and session for one CLI invocation.
pub struct Context {
    pub state: AppState<SupabaseClient>,
    pub user: Option<SessionUser>,
    pub json: bool,
}

impl Context {
    /// Build the context, signing in if an email was given.
    ///
    /// # Errors
    ///
    /// Returns an error if the password variable is missing or sign-in fails.
    pub async fn new(
        state: AppState<SupabaseClient>,
        email: Option<String>,
        json: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let user = match email {
            Some(email) => {
                let password = std::env::var(PASSWORD_ENV)
                    .map(SecretString::from)
                    .map_err(|_| format!("{PASSWORD_ENV} not set"))?;
                Some(state.sign_in(&email, &password).await?)
            }
            None => None,
        };
        Ok(Self { state, user, json })
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSignedIn` without `--email`.
    pub fn require_user(&self) -> Result<&SessionUser, ClientError> {
        self.user.as_ref().ok_or(ClientError::NotSignedIn)
    }

    /// Print `value` as JSON with `--json`, otherwise run `text`.
    pub fn emit<T: serde::Serialize + ?Sized>(&self, value: &T, text: impl FnOnce()) {
        if self.json {
            match serde_json::to_string_pretty(value) {
                Ok(rendered) => println!("{rendered}"),
                Err(e) => tracing::error!(error = %e, "Failed to render JSON"),
            }
        } else {
            text();
        }
    }

    /// Deliver queued cart writes once and report what happened.
    pub async fn flush_outbox(&self) {
        let report = self.state.sync_now().await;
        if let Some((_, error)) = &report.failed {
            eprintln!(
                "Remote sync failed ({error}); {} write(s) queued for retry",
                report.remaining
            );
        }
        for (_, error) in &report.abandoned {
            eprintln!("Remote sync gave up: {error}");
        }
    }
}
