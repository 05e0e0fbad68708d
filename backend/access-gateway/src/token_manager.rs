//! Issues session credentials and decides when they must be replaced.

use std::sync::Arc;

use chrono::Utc;
use cookie::Cookie;
use session_claims::{
    auth_cookie, token_from_cookie_header, Claims, ClaimsCodec, AUTH_COOKIE_NAME,
};
use tracing::{debug, error, info};

use crate::config::AuthSettings;
use crate::error::{GatewayError, Result};
use crate::metrics::GatewayMetrics;
use crate::refresh_set::RefreshSet;
use crate::repository::UserRepository;

/// Credential lifetime and transport settings.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub validity: chrono::Duration,
    pub refresh_window: chrono::Duration,
    pub cookie_name: String,
    pub domain: Option<String>,
}

impl TryFrom<&AuthSettings> for TokenSettings {
    type Error = GatewayError;

    fn try_from(auth: &AuthSettings) -> Result<Self> {
        Ok(Self {
            validity: chrono_duration("token validity", auth.token_validity)?,
            refresh_window: chrono_duration("refresh window", auth.refresh_window)?,
            cookie_name: auth.cookie_name.clone(),
            domain: auth.domain.clone(),
        })
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            validity: chrono::Duration::minutes(15),
            refresh_window: chrono::Duration::minutes(1),
            cookie_name: AUTH_COOKIE_NAME.to_string(),
            domain: None,
        }
    }
}

fn chrono_duration(what: &str, duration: std::time::Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|_| GatewayError::Configuration(format!("{what} of {duration:?} is out of range")))
}

pub struct TokenManager {
    repository: Arc<dyn UserRepository>,
    codec: ClaimsCodec,
    refresh_set: RefreshSet,
    settings: TokenSettings,
    metrics: GatewayMetrics,
}

impl TokenManager {
    /// Build a manager, loading pending refreshes from the store.
    pub async fn new(
        repository: Arc<dyn UserRepository>,
        codec: ClaimsCodec,
        settings: TokenSettings,
    ) -> Result<Self> {
        let refresh_set = RefreshSet::load(repository.clone()).await?;

        Ok(Self {
            repository,
            codec,
            refresh_set,
            settings,
            metrics: GatewayMetrics::new(),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.settings.cookie_name
    }

    pub fn repository(&self) -> &Arc<dyn UserRepository> {
        &self.repository
    }

    /// Compute claims for `user_id` from current store state.
    pub async fn new_claims(&self, user_id: u64) -> Result<Claims> {
        let user = self.repository.get_user(user_id).await?;
        let enrollments = self.repository.get_user_enrollments(user_id).await?;
        let groups = self.repository.get_user_groups(user_id).await?;

        Ok(Claims::issue(
            user.id,
            user.is_admin,
            enrollments.into_iter().map(|e| (e.course_id, e.status)),
            groups,
            self.settings.validity,
        ))
    }

    /// Issue fresh claims for `user_id` and wrap the signed token in the auth cookie.
    pub async fn new_credential(&self, user_id: u64) -> Result<(Claims, Cookie<'static>)> {
        let claims = self.new_claims(user_id).await?;
        let token = self.codec.issue(&claims)?;
        let cookie = auth_cookie(
            &self.settings.cookie_name,
            &token,
            self.settings.domain.as_deref(),
            claims.expires_at(),
        );

        debug!(user_id, expires_at = claims.expires_at(), "Issued session credential");
        Ok((claims, cookie))
    }

    /// Verify a bare signed token.
    pub fn claims_from_token(&self, token: &str) -> Result<Claims> {
        Ok(self.codec.parse(token)?)
    }

    /// Extract and verify the auth cookie from a `cookie` header value.
    pub fn claims_from_cookie_header(&self, header: &str) -> Result<Claims> {
        let token = token_from_cookie_header(header, &self.settings.cookie_name)
            .ok_or_else(|| GatewayError::Unauthenticated("missing auth cookie".to_string()))?;
        self.claims_from_token(&token)
    }

    /// True if the user is flagged or the claims are inside the refresh window.
    pub async fn refresh_required(&self, claims: &Claims) -> bool {
        self.refresh_set.contains(claims.user_id()).await || self.expires_soon(claims)
    }

    fn expires_soon(&self, claims: &Claims) -> bool {
        claims.remaining(Utc::now()) < self.settings.refresh_window
    }

    /// Flag `user_id` for fresh claims on its next request.
    pub async fn mark(&self, user_id: u64) -> Result<()> {
        Ok(self.refresh_set.mark(user_id).await?)
    }

    pub async fn clear(&self, user_id: u64) -> Result<()> {
        Ok(self.refresh_set.clear(user_id).await?)
    }

    pub async fn is_marked(&self, user_id: u64) -> bool {
        self.refresh_set.contains(user_id).await
    }

    /// Replace `claims` if required.
    ///
    /// Returns `None` when the presented claims are still good. Otherwise the
    /// user's flag is cleared and a new credential minted; if minting fails the
    /// flag is restored so the next request tries again.
    pub async fn refresh(&self, claims: &Claims) -> Result<Option<(Claims, Cookie<'static>)>> {
        let user_id = claims.user_id();
        let flagged = self.refresh_set.contains(user_id).await;
        if !flagged && !self.expires_soon(claims) {
            return Ok(None);
        }

        self.clear(user_id).await?;
        match self.new_credential(user_id).await {
            Ok(credential) => {
                let reason = if flagged { "role_change" } else { "expiry" };
                self.metrics.record_refresh(reason);
                info!(user_id, reason, "Refreshed session credential");
                Ok(Some(credential))
            }
            Err(err) => {
                if flagged {
                    if let Err(mark_err) = self.mark(user_id).await {
                        error!(user_id, error = %mark_err, "Failed to restore refresh flag");
                    }
                }
                Err(err)
            }
        }
    }
}
