//! User profiles.

use komorebi_core::{Profile, ProfileUpdate, UserId};
use tracing::instrument;

use crate::error::{ClientError, Result};
use crate::gateway::RemoteGateway;

/// Maximum display name length, in characters.
const MAX_DISPLAY_NAME_CHARS: usize = 50;

/// Profile reads and updates.
pub struct ProfileService<'a, G> {
    gateway: &'a G,
}

impl<'a, G: RemoteGateway> ProfileService<'a, G> {
    #[must_use]
    pub const fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the user has no profile.
    pub async fn profile(&self, user: &UserId) -> Result<Profile> {
        self.gateway
            .fetch_profiles(std::slice::from_ref(user))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("profile {user}")))
    }

    /// Apply a partial update to `user`'s profile.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::BadRequest` for an empty update or an invalid
    /// display name.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, user: &UserId, update: &ProfileUpdate) -> Result<Profile> {
        if update.is_empty() {
            return Err(ClientError::BadRequest("nothing to update".to_string()));
        }

        let mut update = update.clone();
        if let Some(name) = update.display_name.as_deref() {
            let name = name.trim();
            if name.is_empty() {
                return Err(ClientError::BadRequest(
                    "display name cannot be empty".to_string(),
                ));
            }
            if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
                return Err(ClientError::BadRequest(format!(
                    "display name must be at most {MAX_DISPLAY_NAME_CHARS} characters"
                )));
            }
            update.display_name = Some(name.to_owned());
        }

        Ok(self.gateway.update_profile(user, &update).await?)
    }
}
