use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// The role a user holds in the community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "user_role")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Committee member with access to financial records.
    #[postgres(name = "admin")]
    Admin,
    /// Regular resident.
    #[postgres(name = "resident")]
    Resident,
}

/// Represents a user in the system.
#[derive(Clone)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The house number the account is keyed on.
    pub house_number: String,
    /// The Argon2id PHC string of the user's password.
    pub password_hash: String,
    /// The user's role.
    pub role: Role,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Builds a new user record with a fresh identifier.
    pub fn new(house_number: String, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            house_number,
            password_hash,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the fields that are safe to hand to a client.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            house_number: self.house_number.clone(),
            role: self.role,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("house_number", &self.house_number)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl TryFrom<&Row> for User {
    type Error = AppError;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(User {
            id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
            house_number: row.try_get("house_number").map_err(|_| AppError::MissingData("house_number".to_string()))?,
            password_hash: row.try_get("password_hash").map_err(|_| AppError::MissingData("password_hash".to_string()))?,
            role: row.try_get("role").map_err(|_| AppError::MissingData("role".to_string()))?,
            created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
            updated_at: row.try_get("updated_at").map_err(|_| AppError::MissingData("updated_at".to_string()))?,
        })
    }
}

/// The sanitized projection of a [`User`]. Never carries the credential hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's house number.
    pub house_number: String,
    /// The user's role.
    pub role: Role,
}

impl UserProfile {
    /// Whether the user may access administrative resources.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
