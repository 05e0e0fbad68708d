//! Configuration for the access gateway
//!
//! Loads settings from environment variables, with a `.env` file honoured in
//! debug builds.
//!
//! # Example
//!
//! ```no_run
//! use access_gateway::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Auth cookie: {}", settings.auth.cookie_name);
//!     Ok(())
//! }
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use grpc_access_control::UnlistedMethods;
use session_claims::{generate_secret, validate_secret_strength, SecretStrength, AUTH_COOKIE_NAME};
use tracing::{info, warn};

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub auth: AuthSettings,
    pub exchange: ExchangeSettings,
    pub policy: PolicySettings,
    pub database: Option<DatabaseSettings>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Load .env file in development
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
        }

        Ok(Settings {
            auth: AuthSettings::from_env()?,
            exchange: ExchangeSettings::from_env()?,
            policy: PolicySettings::from_env()?,
            database: DatabaseSettings::from_env()?,
        })
    }
}

/// Credential issuing and checking
#[derive(Clone)]
pub struct AuthSettings {
    pub secret: String,
    pub domain: Option<String>,
    pub cookie_name: String,
    pub token_validity: Duration,
    pub refresh_window: Duration,
    pub call_deadline: Duration,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("cookie_name", &self.cookie_name)
            .field("token_validity", &self.token_validity)
            .field("refresh_window", &self.refresh_window)
            .field("call_deadline", &self.call_deadline)
            .finish()
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            domain: None,
            cookie_name: AUTH_COOKIE_NAME.to_string(),
            token_validity: Duration::from_secs(15 * 60),
            refresh_window: Duration::from_secs(60),
            call_deadline: Duration::from_secs(120),
        }
    }
}

impl AuthSettings {
    fn from_env() -> Result<Self> {
        let secret = match env::var("AUTH_SECRET") {
            Ok(secret) => {
                if validate_secret_strength(&secret) == SecretStrength::Weak {
                    bail!("AUTH_SECRET is too weak: use at least 32 random bytes");
                }
                secret
            }
            Err(_) => {
                warn!("AUTH_SECRET not set; generated an ephemeral secret, credentials will not survive restart");
                generate_secret(64)
            }
        };

        let settings = Self {
            secret,
            domain: env::var("AUTH_DOMAIN").ok().filter(|d| !d.is_empty()),
            cookie_name: env::var("AUTH_COOKIE_NAME")
                .unwrap_or_else(|_| AUTH_COOKIE_NAME.to_string()),
            token_validity: seconds("TOKEN_VALIDITY_SECS", 15 * 60)?,
            refresh_window: seconds("TOKEN_REFRESH_WINDOW_SECS", 60)?,
            call_deadline: seconds("CALL_DEADLINE_SECS", 120)?,
        };

        if settings.refresh_window >= settings.token_validity {
            bail!("TOKEN_REFRESH_WINDOW_SECS must be shorter than TOKEN_VALIDITY_SECS");
        }
        Ok(settings)
    }
}

/// External personal-access-token exchange
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub enabled: bool,
    pub cache_capacity: usize,
    pub token_prefixes: Vec<String>,
    pub identity_api: String,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_capacity: 1024,
            token_prefixes: vec!["ghp_".to_string(), "github_pat_".to_string()],
            identity_api: "https://api.github.com".to_string(),
        }
    }
}

impl ExchangeSettings {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let token_prefixes = match env::var("EXTERNAL_TOKEN_PREFIXES") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.token_prefixes,
        };

        Ok(Self {
            enabled: parse_or("EXTERNAL_TOKENS_ENABLED", true)?,
            cache_capacity: parse_or("EXCHANGE_CACHE_CAPACITY", defaults.cache_capacity)?,
            token_prefixes,
            identity_api: env::var("EXTERNAL_IDENTITY_API").unwrap_or(defaults.identity_api),
        })
    }
}

/// Access policy behaviour
#[derive(Debug, Clone, Default)]
pub struct PolicySettings {
    pub unlisted_methods: UnlistedMethods,
    pub track_role_changes: bool,
}

impl PolicySettings {
    fn from_env() -> Result<Self> {
        let unlisted_methods = match env::var("UNLISTED_METHODS") {
            Ok(raw) => raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid UNLISTED_METHODS")?,
            Err(_) => UnlistedMethods::default(),
        };

        Ok(Self {
            unlisted_methods,
            track_role_changes: parse_or("TRACK_ROLE_CHANGES", true)?,
        })
    }
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    /// `None` when `DATABASE_URL` is unset, in which case the gateway runs on
    /// the in-memory store.
    fn from_env() -> Result<Option<Self>> {
        let Ok(url) = env::var("DATABASE_URL") else {
            info!("DATABASE_URL not set; using in-memory user store");
            return Ok(None);
        };

        Ok(Some(Self {
            url,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
        }))
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}")),
        Err(_) => Ok(default),
    }
}

/// Upper bound for any configured duration: ten years.
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn seconds(key: &str, default: u64) -> Result<Duration> {
    let secs: u64 = parse_or(key, default)?;
    check_seconds(key, secs)?;
    Ok(Duration::from_secs(secs))
}

fn check_seconds(key: &str, secs: u64) -> Result<()> {
    if secs == 0 {
        bail!("{key} must be greater than zero");
    }
    if secs > MAX_DURATION_SECS {
        bail!("{key} must be at most {MAX_DURATION_SECS} seconds");
    }
    Ok(())
}
