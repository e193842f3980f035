use crate::crypto::{password, token};
use crate::error::{AppError, Result};
use crate::models::session::{Session, SessionState};
use crate::models::user::{Role, User, UserProfile};
use crate::repositories::store::SessionStore;
use crate::validation::auth::{validate_house_number, validate_password};
use chrono::{Duration, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

/// The result of a successful login.
#[derive(Clone)]
pub struct LoginOutcome {
    /// The freshly minted bearer token. Only ever handed to the client.
    pub token: String,
    /// The authenticated user.
    pub user: UserProfile,
}

impl fmt::Debug for LoginOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginOutcome")
            .field("token", &format_args!("{}…", token::redact(&self.token)))
            .field("user", &self.user)
            .finish()
    }
}

/// Issues, verifies and revokes session tokens.
///
/// Authentication only: callers decide what a verified [`UserProfile`] may
/// do, typically through [`is_admin`].
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn SessionStore>,
    session_ttl: Duration,
    store_timeout: std::time::Duration,
}

impl AuthService {
    /// Creates a new `AuthService`.
    ///
    /// # Arguments
    ///
    /// * `store` - The user and session store.
    /// * `session_ttl` - Fixed lifetime of every issued session.
    /// * `store_timeout` - Deadline applied to each store call.
    pub fn new(
        store: Arc<dyn SessionStore>,
        session_ttl: Duration,
        store_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            session_ttl,
            store_timeout,
        }
    }

    /// Runs a store call under the configured deadline.
    async fn guarded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::StoreTimeout(op)),
        }
    }

    /// Authenticates a resident and opens a new session.
    ///
    /// Unknown house numbers and wrong passwords produce the same `Ok(None)`
    /// so callers cannot tell which one occurred.
    ///
    /// # Returns
    ///
    /// `Ok(Some(outcome))` on success, `Ok(None)` on bad credentials, and an
    /// error for missing input or store failures.
    pub async fn login(&self, house_number: &str, password: &str) -> Result<Option<LoginOutcome>> {
        let house_number = house_number.trim();
        if house_number.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "House number and password are required".to_string(),
            ));
        }

        tracing::debug!("🔐 Authenticating house: {}", house_number);

        let user = self
            .guarded(
                "find_user_by_house_number",
                self.store.find_user_by_house_number(house_number),
            )
            .await?;

        let Some(user) = user else {
            // Same Argon2 cost as a wrong password, so timing does not reveal the account.
            verify_dummy_password_blocking(password).await?;
            tracing::warn!("❌ Login rejected for house: {}", house_number);
            return Ok(None);
        };

        if !verify_password_blocking(password, &user.password_hash).await? {
            tracing::warn!("❌ Login rejected for house: {}", house_number);
            return Ok(None);
        }

        let token = token::generate_session_token();
        let now = Utc::now();
        let session = Session {
            token_hash: token::digest_token(&token),
            user_id: user.id,
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        self.guarded("insert_session", self.store.insert_session(&session))
            .await?;

        tracing::info!(
            "✅ Session {}… opened for user {}",
            token::redact(&token),
            user.id
        );

        Ok(Some(LoginOutcome {
            token,
            user: user.profile(),
        }))
    }

    /// Revokes a session. Unknown or already revoked tokens are ignored.
    pub async fn logout(&self, session_token: &str) -> Result<()> {
        if session_token.is_empty() {
            return Ok(());
        }

        let token_hash = token::digest_token(session_token);
        self.guarded("delete_session", self.store.delete_session(&token_hash))
            .await?;

        tracing::info!("👋 Session {}… closed", token::redact(session_token));
        Ok(())
    }

    /// Resolves a session token to the user it belongs to.
    ///
    /// Expired rows are reported as invalid but left for the purge job.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the token is empty, unknown, expired, or its user is gone.
    pub async fn verify_session(&self, session_token: &str) -> Result<Option<UserProfile>> {
        if session_token.is_empty() {
            return Ok(None);
        }

        let token_hash = token::digest_token(session_token);
        let session = self
            .guarded("find_session", self.store.find_session(&token_hash))
            .await?;

        let session = match (Session::state_at(session.as_ref(), Utc::now()), session) {
            (SessionState::Active, Some(session)) => session,
            (SessionState::Expired, _) => {
                tracing::debug!("Session {}… expired", token::redact(session_token));
                return Ok(None);
            }
            _ => {
                tracing::debug!("Session {}… not found", token::redact(session_token));
                return Ok(None);
            }
        };

        let user = self
            .guarded("find_user_by_id", self.store.find_user_by_id(session.user_id))
            .await?;

        Ok(user.map(|u| u.profile()))
    }

    /// Changes a user's password after checking the current one.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if `current_password` does not match.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<bool> {
        validate_password(new_password)?;

        let user = self
            .guarded("find_user_by_id", self.store.find_user_by_id(user_id))
            .await?
            .ok_or(AppError::NotFound)?;

        if !verify_password_blocking(current_password, &user.password_hash).await? {
            tracing::warn!("❌ Password change rejected for user: {}", user_id);
            return Ok(false);
        }

        let new_hash = hash_password_blocking(new_password).await?;
        self.guarded(
            "update_password_hash",
            self.store.update_password_hash(user_id, &new_hash),
        )
        .await?;

        tracing::info!("✅ Password changed for user: {}", user_id);
        Ok(true)
    }

    /// Changes a user's role. Administrative action.
    pub async fn set_role(&self, house_number: &str, role: Role) -> Result<Option<UserProfile>> {
        let user = self
            .guarded("update_role", self.store.update_role(house_number, role))
            .await?;

        if let Some(ref u) = user {
            tracing::info!("✅ Role of house {} set to {:?}", u.house_number, role);
        }

        Ok(user.map(|u| u.profile()))
    }

    /// Creates a user account.
    pub async fn provision_user(
        &self,
        house_number: &str,
        password: &str,
        role: Role,
    ) -> Result<UserProfile> {
        validate_house_number(house_number)?;
        validate_password(password)?;

        let password_hash = hash_password_blocking(password).await?;
        let user = User::new(house_number.to_string(), password_hash, role);

        self.guarded("insert_user", self.store.insert_user(&user))
            .await?;

        tracing::info!("✅ User provisioned for house {} ({:?})", user.house_number, role);
        Ok(user.profile())
    }

    /// Provisions the configured administrator unless the house number already exists.
    pub async fn ensure_bootstrap_admin(&self, house_number: &str, password: &str) -> Result<()> {
        let existing = self
            .guarded(
                "find_user_by_house_number",
                self.store.find_user_by_house_number(house_number),
            )
            .await?;

        match existing {
            Some(user) if user.role == Role::Admin => {
                tracing::info!("✅ Bootstrap admin {} already present", house_number);
            }
            Some(_) => {
                tracing::warn!(
                    "⚠️ Bootstrap house {} exists without admin role; leaving it unchanged",
                    house_number
                );
            }
            None => {
                self.provision_user(house_number, password, Role::Admin).await?;
            }
        }

        Ok(())
    }

    /// Deletes expired sessions.
    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        self.guarded(
            "purge_expired_sessions",
            self.store.purge_expired_sessions(Utc::now()),
        )
        .await
    }
}

/// Whether a verified user may access administrative resources.
pub fn is_admin(user: &UserProfile) -> bool {
    user.is_admin()
}

async fn hash_password_blocking(plain: &str) -> Result<String> {
    let plain = Zeroizing::new(plain.to_string());
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

async fn verify_dummy_password_blocking(plain: &str) -> Result<()> {
    let plain = Zeroizing::new(plain.to_string());
    tokio::task::spawn_blocking(move || password::verify_dummy_password(&plain))
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
}

async fn verify_password_blocking(plain: &str, hash: &str) -> Result<bool> {
    let plain = Zeroizing::new(plain.to_string());
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
}
