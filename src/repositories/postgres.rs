use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        session::Session,
        user::{Role, User},
    },
    repositories::store::SessionStore,
};

/// [`SessionStore`] backed by PostgreSQL through a deadpool connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Creates a new `PgStore` over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn find_user_by_house_number(&self, house_number: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                SELECT id, house_number, password_hash, role, created_at, updated_at
                FROM users
                WHERE house_number = $1
                "#,
            )
            .await?;
        let row = client.query_opt(&stmt, &[&house_number]).await?;
        row.as_ref().map(User::try_from).transpose()
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                SELECT id, house_number, password_hash, role, created_at, updated_at
                FROM users
                WHERE id = $1
                "#,
            )
            .await?;
        let row = client.query_opt(&stmt, &[&user_id]).await?;
        row.as_ref().map(User::try_from).transpose()
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                INSERT INTO users (id, house_number, password_hash, role, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .await?;
        let result = client
            .execute(
                &stmt,
                &[
                    &user.id,
                    &user.house_number,
                    &user.password_hash,
                    &user.role,
                    &user.created_at,
                    &user.updated_at,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(AppError::Conflict(
                format!("House number {} is already registered", user.house_number),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                UPDATE users
                SET password_hash = $1, updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .await?;
        client.execute(&stmt, &[&password_hash, &user_id]).await?;
        Ok(())
    }

    async fn update_role(&self, house_number: &str, role: Role) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                UPDATE users
                SET role = $1, updated_at = NOW()
                WHERE house_number = $2
                RETURNING id, house_number, password_hash, role, created_at, updated_at
                "#,
            )
            .await?;
        let row = client.query_opt(&stmt, &[&role, &house_number]).await?;
        row.as_ref().map(User::try_from).transpose()
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .await?;
        client
            .execute(
                &stmt,
                &[
                    &session.token_hash,
                    &session.user_id,
                    &session.created_at,
                    &session.expires_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<Session>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                SELECT token_hash, user_id, created_at, expires_at
                FROM sessions
                WHERE token_hash = $1
                "#,
            )
            .await?;
        let row = client.query_opt(&stmt, &[&token_hash]).await?;
        row.as_ref().map(Session::try_from).transpose()
    }

    async fn delete_session(&self, token_hash: &str) -> Result<()> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("DELETE FROM sessions WHERE token_hash = $1")
            .await?;
        client.execute(&stmt, &[&token_hash]).await?;
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("DELETE FROM sessions WHERE expires_at <= $1")
            .await?;
        let removed = client.execute(&stmt, &[&now]).await?;
        Ok(removed)
    }
}
