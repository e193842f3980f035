use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use http::HeaderValue;
use zeroize::Zeroizing;

/// Longest session lifetime accepted, one year.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

/// Credentials of the administrator provisioned at startup.
#[derive(Clone)]
pub struct BootstrapAdmin {
    /// The administrator's house number.
    pub house_number: String,
    /// The administrator's initial password.
    pub password: Zeroizing<String>,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The deployment environment (`development`, `staging`, `production`).
    pub app_env: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The URL of the PostgreSQL database. Sessions live in memory when unset.
    pub database_url: Option<String>,
    /// The URL of the Redis server backing the login throttle.
    pub redis_url: Option<String>,
    /// The lifetime of a session in hours.
    pub session_ttl_hours: i64,
    /// Deadline applied to every session store call, in milliseconds.
    pub store_timeout_ms: u64,
    /// Interval between expired-session purges, in seconds.
    pub session_cleanup_interval_secs: u64,
    /// Failed login attempts allowed per house number before lockout.
    pub login_max_attempts: u32,
    /// Duration of a login lockout, in seconds.
    pub login_lockout_secs: u64,
    /// Origins allowed to call the API with credentials.
    pub cors_origins: Vec<HeaderValue>,
    /// Administrator provisioned at startup, if configured.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_env: "development".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            redis_url: None,
            session_ttl_hours: 24,
            store_timeout_ms: 5_000,
            session_cleanup_interval_secs: 3_600,
            login_max_attempts: 5,
            login_lockout_secs: 900,
            cors_origins: vec![HeaderValue::from_static("http://localhost:3000")],
            bootstrap_admin: None,
        }
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let app_env = env::var("APP_ENV").unwrap_or(defaults.app_env);

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        if database_url.is_none() && app_env == "production" {
            anyhow::bail!("DATABASE_URL must be set when APP_ENV=production");
        }

        let cors_origins = match env::var("CORS_ORIGINS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(|o| {
                    o.parse::<HeaderValue>()
                        .with_context(|| format!("Invalid origin in CORS_ORIGINS: {}", o))
                })
                .collect::<Result<Vec<_>>>()?,
            Err(_) => defaults.cors_origins,
        };

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_HOUSE_NUMBER"),
            env::var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Ok(house_number), Ok(password)) => Some(BootstrapAdmin {
                house_number,
                password: Zeroizing::new(password),
            }),
            (Ok(_), Err(_)) | (Err(_), Ok(_)) => {
                anyhow::bail!(
                    "BOOTSTRAP_ADMIN_HOUSE_NUMBER and BOOTSTRAP_ADMIN_PASSWORD must be set together"
                );
            }
            _ => None,
        };

        let config = Self {
            app_env,
            bind_addr: parse_or("BIND_ADDR", defaults.bind_addr)?,
            database_url,
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            session_ttl_hours: parse_or("SESSION_TTL_HOURS", defaults.session_ttl_hours)?,
            store_timeout_ms: parse_or("STORE_TIMEOUT_MS", defaults.store_timeout_ms)?,
            session_cleanup_interval_secs: parse_or(
                "SESSION_CLEANUP_INTERVAL_SECS",
                defaults.session_cleanup_interval_secs,
            )?,
            login_max_attempts: parse_or("LOGIN_MAX_ATTEMPTS", defaults.login_max_attempts)?,
            login_lockout_secs: parse_or("LOGIN_LOCKOUT_SECS", defaults.login_lockout_secs)?,
            cors_origins,
            bootstrap_admin,
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would break session issuance or the purge loop.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.session_ttl_hours) {
            anyhow::bail!(
                "SESSION_TTL_HOURS must be between 1 and {}",
                MAX_SESSION_TTL_HOURS
            );
        }
        if self.session_cleanup_interval_secs == 0 {
            anyhow::bail!("SESSION_CLEANUP_INTERVAL_SECS must be positive");
        }
        if self.store_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS must be positive");
        }
        if self.login_max_attempts == 0 {
            anyhow::bail!("LOGIN_MAX_ATTEMPTS must be positive");
        }
        Ok(())
    }

    /// Whether cookies must carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.app_env != "development"
    }

    /// Session lifetime in seconds, also used as the cookie `Max-Age`.
    pub fn session_ttl_secs(&self) -> i64 {
        self.session_ttl_hours * 3600
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}
