use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Represents a user session.
///
/// Only the SHA-256 digest of the bearer token is persisted; the token
/// itself lives solely in the client's cookie. Sessions are inserted and
/// deleted, never updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Hex-encoded SHA-256 digest of the session token.
    pub token_hash: String,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle of a session token as seen at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Present and not yet expired.
    Active,
    /// Present but past its expiry.
    Expired,
    /// Deleted by logout or purged.
    Absent,
}

impl Session {
    /// Whether the session is expired at `now`. Expiry is inclusive.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Classifies an optional session row at `now`.
    pub fn state_at(session: Option<&Session>, now: DateTime<Utc>) -> SessionState {
        match session {
            None => SessionState::Absent,
            Some(s) if s.is_expired_at(now) => SessionState::Expired,
            Some(_) => SessionState::Active,
        }
    }
}

impl TryFrom<&Row> for Session {
    type Error = AppError;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Session {
            token_hash: row.try_get("token_hash").map_err(|_| AppError::MissingData("token_hash".to_string()))?,
            user_id: row.try_get("user_id").map_err(|_| AppError::MissingData("user_id".to_string()))?,
            created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
            expires_at: row.try_get("expires_at").map_err(|_| AppError::MissingData("expires_at".to_string()))?,
        })
    }
}
