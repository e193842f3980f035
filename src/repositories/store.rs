use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        session::Session,
        user::{Role, User},
    },
};

/// Persistence contract for users and sessions.
///
/// Implementations only need atomic single-row reads and writes; no
/// operation here spans more than one row except the expiry purge.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Finds a user by house number.
    async fn find_user_by_house_number(&self, house_number: &str) -> Result<Option<User>>;

    /// Finds a user by ID.
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Inserts a user. Fails with `AppError::Conflict` if the house number is taken.
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Replaces a user's password hash.
    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    /// Changes a user's role, returning the updated user if it exists.
    async fn update_role(&self, house_number: &str, role: Role) -> Result<Option<User>>;

    /// Persists a new session.
    async fn insert_session(&self, session: &Session) -> Result<()>;

    /// Finds a session by token digest, expired or not.
    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>>;

    /// Deletes a session by token digest. Deleting a missing session is not an error.
    async fn delete_session(&self, token_hash: &str) -> Result<()>;

    /// Deletes every session with `expires_at <= now`, returning how many were removed.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}
