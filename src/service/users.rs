// User CRUD plus the friendship graph: validation and existence checks
// happen here, atomicity of the dual-row writes lives in the store.
use crate::domain::User;
use crate::error::{AppError, AppResult};
use crate::storage::DynUserStorage;

#[derive(Clone)]
pub struct UserService {
    store: DynUserStorage,
}

/// Result of a friend add/remove. A no-op (already friends, not friends)
/// is reported here as `changed = false`, never as an error.
#[derive(Debug, Clone, PartialEq)]
pub struct FriendshipOutcome {
    pub changed: bool,
    pub message: String,
}

impl UserService {
    pub fn new(store: DynUserStorage) -> Self {
        Self { store }
    }

    pub async fn create(&self, mut user: User) -> AppResult<User> {
        user.validate()?;
        if self.store.email_in_use(&user.email, 0).await? {
            return Err(AppError::BadRequest("email is already in use".into()));
        }
        user.normalize();
        let created = self.store.create(user).await?;
        tracing::debug!("created user {}", created.id);
        Ok(created)
    }

    pub async fn update(&self, mut user: User) -> AppResult<User> {
        user.validate()?;
        if self.store.email_in_use(&user.email, user.id).await? {
            return Err(AppError::BadRequest("email is already in use".into()));
        }
        user.normalize();
        Ok(self.store.update(user).await?)
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, id: i64) -> AppResult<User> {
        self.require(id).await
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        if !self.store.delete(id).await? {
            return Err(not_found(id));
        }
        Ok(())
    }

    pub async fn add_friend(&self, user_id: i64, friend_id: i64) -> AppResult<FriendshipOutcome> {
        if user_id == friend_id {
            return Err(AppError::BadRequest(
                "a user cannot befriend themselves".into(),
            ));
        }
        self.require(user_id).await?;
        let friend = self.require(friend_id).await?;

        let added = self.store.add_friend(user_id, friend_id).await?;
        let message = if added {
            format!("{} is now your friend", friend.display_name())
        } else {
            format!("{} is already your friend", friend.display_name())
        };
        Ok(FriendshipOutcome {
            changed: added,
            message,
        })
    }

    pub async fn remove_friend(
        &self,
        user_id: i64,
        friend_id: i64,
    ) -> AppResult<FriendshipOutcome> {
        self.require(user_id).await?;
        let friend = self.require(friend_id).await?;

        let removed = self.store.remove_friend(user_id, friend_id).await?;
        let message = if removed {
            format!("{} is no longer your friend", friend.display_name())
        } else {
            format!("{} is not your friend", friend.display_name())
        };
        Ok(FriendshipOutcome {
            changed: removed,
            message,
        })
    }

    pub async fn get_friends(&self, user_id: i64) -> AppResult<Vec<User>> {
        self.require(user_id).await?;

        // Drop ids that no longer resolve rather than failing the read
        let mut friends = Vec::new();
        for id in self.store.friend_ids(user_id).await? {
            if let Some(user) = self.store.get(id).await? {
                friends.push(user);
            }
        }
        Ok(friends)
    }

    pub async fn get_common_friends(&self, user_id: i64, other_id: i64) -> AppResult<Vec<User>> {
        self.require(user_id).await?;
        self.require(other_id).await?;

        let other_ids: std::collections::HashSet<i64> =
            self.store.friend_ids(other_id).await?.into_iter().collect();

        let mut common = Vec::new();
        for id in self.store.friend_ids(user_id).await? {
            // Never list either endpoint as their own common friend
            if id == user_id || id == other_id || !other_ids.contains(&id) {
                continue;
            }
            if let Some(user) = self.store.get(id).await? {
                common.push(user);
            }
        }
        Ok(common)
    }

    // First missing id wins the error message, user before friend.
    async fn require(&self, id: i64) -> AppResult<User> {
        self.store.get(id).await?.ok_or_else(|| not_found(id))
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("user with id {} not found", id))
}
