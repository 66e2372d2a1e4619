use std::sync::Arc;

use domains::{Creation, DomainError, Entity, Result, StoreError, User, UserProfile, UserRepository};
use tracing::{debug, info, instrument};

/// Registration and profile management.
pub struct UserService {
    users: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Registers a user. When the nickname or the email is already taken the
    /// result carries every user that collides with either of them.
    #[instrument(skip(self, profile))]
    pub async fn create(
        &self,
        nickname: &str,
        profile: UserProfile,
    ) -> Result<Creation<User, Vec<User>>> {
        let conflicts = self.users.find_conflicts(nickname, &profile.email).await?;
        if !conflicts.is_empty() {
            debug!(conflicts = conflicts.len(), "user already exists");
            return Ok(Creation::Conflict(conflicts));
        }

        let user = User {
            nickname: nickname.to_string(),
            fullname: profile.fullname,
            about: profile.about,
            email: profile.email,
        };
        match self.users.insert(&user).await {
            Ok(()) => {
                info!(nickname = %user.nickname, "user created");
                Ok(Creation::Created(user))
            }
            // lost a race against a concurrent registration
            Err(StoreError::UniqueViolation(_)) => {
                let conflicts = self.users.find_conflicts(nickname, &user.email).await?;
                Ok(Creation::Conflict(conflicts))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn profile(&self, nickname: &str) -> Result<User> {
        self.users
            .find_by_nickname(nickname)
            .await?
            .ok_or_else(|| DomainError::not_found(Entity::User, nickname))
    }

    /// Updates the non-empty fields of `patch`.
    #[instrument(skip(self, patch))]
    pub async fn change(&self, nickname: &str, patch: UserProfile) -> Result<User> {
        let current = self.profile(nickname).await?;
        let updated = patch.merge_into(&current);

        if updated.email != current.email {
            if let Some(owner) = self.users.find_by_email(&updated.email).await? {
                if !owner.nickname.eq_ignore_ascii_case(&current.nickname) {
                    return Err(DomainError::EmailTaken(updated.email));
                }
            }
        }

        match self.users.update(&updated).await {
            Ok(()) => Ok(updated),
            Err(StoreError::UniqueViolation(_)) => Err(DomainError::EmailTaken(updated.email)),
            Err(err) => Err(err.into()),
        }
    }
}
