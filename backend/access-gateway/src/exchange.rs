//! Exchange of external personal access tokens for session credentials.
//!
//! Command-line clients authenticate with a provider-issued token instead of
//! the browser cookie. The first call with a given token resolves the owning
//! account, mints a session credential for the linked local user and caches
//! it; later calls reuse the cached credential until it is rotated or evicted.
//! A cached credential that no longer verifies, usually because it expired
//! between calls, is dropped and the token is resolved again.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use tracing::{debug, info, warn};

use crate::config::ExchangeSettings;
use crate::error::{GatewayError, Result};
use crate::external::IdentityResolver;
use crate::metrics::GatewayMetrics;
use crate::repository::RepositoryError;
use crate::token_manager::TokenManager;

pub struct TokenExchange {
    cache: Mutex<LruCache<String, String>>,
    prefixes: Vec<String>,
    resolver: Arc<dyn IdentityResolver>,
    tokens: Arc<TokenManager>,
    metrics: GatewayMetrics,
}

impl TokenExchange {
    pub fn new(
        resolver: Arc<dyn IdentityResolver>,
        tokens: Arc<TokenManager>,
        settings: &ExchangeSettings,
    ) -> Self {
        let capacity = NonZeroUsize::new(settings.cache_capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            prefixes: settings.token_prefixes.clone(),
            resolver,
            tokens,
            metrics: GatewayMetrics::new(),
        }
    }

    /// True if `token` carries one of the accepted provider prefixes.
    pub fn accepts(&self, token: &str) -> bool {
        self.prefixes.iter().any(|prefix| token.starts_with(prefix.as_str()))
    }

    /// Session credential for `external_token`, minting one on first use.
    ///
    /// ## Errors
    ///
    /// - `InvalidTokenFormat` for unknown prefixes, without any external call
    /// - `ExternalIdentity` if the provider rejects the token
    /// - `Unauthenticated` if no local user is linked to the remote account
    pub async fn resolve(&self, external_token: &str) -> Result<String> {
        if let Some(credential) = self.cached(external_token) {
            match self.tokens.claims_from_token(&credential) {
                Ok(_) => {
                    self.metrics.record_exchange("hit");
                    return Ok(credential);
                }
                Err(e) => {
                    debug!(error = %e, "Dropping cached credential that no longer verifies");
                    self.evict(external_token);
                    self.metrics.record_exchange("stale");
                }
            }
        }

        if !self.accepts(external_token) {
            self.metrics.record_exchange("rejected");
            return Err(GatewayError::InvalidTokenFormat);
        }

        self.metrics.record_exchange("miss");
        let identity = self.resolver.resolve(external_token).await.map_err(|e| {
            warn!(error = %e, "External identity lookup failed");
            GatewayError::from(e)
        })?;

        let user = self
            .tokens
            .repository()
            .get_user_by_remote_identity(&identity.provider, identity.remote_id)
            .await
            .map_err(|e| match e {
                e @ RepositoryError::RemoteIdentityNotFound { .. } => {
                    GatewayError::Unauthenticated(e.to_string())
                }
                other => GatewayError::Repository(other),
            })?;

        let (_, cookie) = self.tokens.new_credential(user.id).await?;
        let credential = cookie.value().to_string();
        self.store(external_token, credential.clone());

        info!(
            user_id = user.id,
            provider = %identity.provider,
            "Exchanged external token for session credential"
        );
        Ok(credential)
    }

    /// Replace the cached credential after the downstream call rotated it.
    pub fn update(&self, external_token: &str, credential: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.peek(external_token).map(String::as_str) != Some(credential) {
            debug!("Rotated cached credential for external token");
            cache.put(external_token.to_string(), credential.to_string());
        }
    }

    pub fn cached(&self, external_token: &str) -> Option<String> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(external_token)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(&self, external_token: &str) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(external_token);
    }

    fn store(&self, external_token: &str, credential: String) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(external_token.to_string(), credential);
    }
}
