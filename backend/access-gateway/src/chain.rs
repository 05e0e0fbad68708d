//! Assembly of the interceptor chain
//!
//! Stage order is fixed:
//!
//! 1. observability
//! 2. validation
//! 3. token_exchange (when external tokens are enabled)
//! 4. identity
//! 5. authorization
//! 6. token_refresh (when role-change tracking is enabled)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use grpc_access_control::{default_table, AccessPolicy};
use session_claims::ClaimsCodec;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::{AuthSettings, Settings};
use crate::exchange::TokenExchange;
use crate::external::GitHubIdentityResolver;
use crate::interceptor::{
    AuthorizationInterceptor, Call, CallResult, Handler, IdentityInterceptor, Interceptor, Next,
    ObservabilityInterceptor, TokenExchangeInterceptor, TokenRefreshInterceptor,
    ValidationInterceptor,
};
use crate::repository::{InMemoryUserRepository, PgUserRepository, UserRepository};
use crate::submissions::StoreSubmissions;
use crate::token_manager::{TokenManager, TokenSettings};

/// Ordered stages in front of one handler.
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    handler: Arc<dyn Handler>,
}

impl InterceptorChain {
    /// Run `call` through every stage and then the handler.
    pub async fn call(&self, call: Call) -> CallResult {
        Next::new(&self.interceptors, self.handler.as_ref())
            .run(call)
            .await
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|stage| stage.name()).collect()
    }
}

pub struct ChainBuilder {
    tokens: Arc<TokenManager>,
    policy: AccessPolicy,
    exchange: Option<Arc<TokenExchange>>,
    track_role_changes: bool,
    deadline: Duration,
}

impl ChainBuilder {
    pub fn new(tokens: Arc<TokenManager>, policy: AccessPolicy) -> Self {
        Self {
            tokens,
            policy,
            exchange: None,
            track_role_changes: true,
            deadline: AuthSettings::default().call_deadline,
        }
    }

    /// Wire every component from loaded settings.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let repository = connect_repository(settings).await?;
        let codec = ClaimsCodec::new(settings.auth.secret.as_bytes());
        let token_settings =
            TokenSettings::try_from(&settings.auth).context("Invalid credential lifetimes")?;
        let tokens = Arc::new(
            TokenManager::new(repository.clone(), codec, token_settings)
                .await
                .context("Failed to load pending claims refreshes")?,
        );

        let policy = AccessPolicy::new(default_table().clone())
            .with_unlisted(settings.policy.unlisted_methods)
            .with_submissions(Arc::new(StoreSubmissions::new(repository)));

        let mut builder = Self::new(tokens.clone(), policy)
            .with_role_change_tracking(settings.policy.track_role_changes)
            .with_deadline(settings.auth.call_deadline);

        if settings.exchange.enabled {
            let resolver = GitHubIdentityResolver::new(settings.exchange.identity_api.clone())
                .context("Failed to build identity provider client")?;
            builder = builder.with_exchange(Arc::new(TokenExchange::new(
                Arc::new(resolver),
                tokens,
                &settings.exchange,
            )));
        }

        Ok(builder)
    }

    pub fn with_exchange(mut self, exchange: Arc<TokenExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn with_role_change_tracking(mut self, enabled: bool) -> Self {
        self.track_role_changes = enabled;
        self
    }

    /// Deadline for everything after the identity stage.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn build(self, handler: impl Handler + 'static) -> InterceptorChain {
        let mut interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(ObservabilityInterceptor::new()),
            Arc::new(ValidationInterceptor),
        ];

        if let Some(exchange) = self.exchange {
            interceptors.push(Arc::new(TokenExchangeInterceptor::new(
                exchange,
                self.tokens.cookie_name(),
            )));
        }

        interceptors.push(Arc::new(IdentityInterceptor::new(
            self.tokens.clone(),
            self.deadline,
        )));
        interceptors.push(Arc::new(AuthorizationInterceptor::new(self.policy)));

        if self.track_role_changes {
            interceptors.push(Arc::new(TokenRefreshInterceptor::new(self.tokens)));
        }

        let chain = InterceptorChain {
            interceptors,
            handler: Arc::new(handler),
        };
        info!(stages = ?chain.stage_names(), "Interceptor chain assembled");
        chain
    }
}

/// Postgres-backed store when a database is configured, in-memory otherwise.
pub async fn connect_repository(settings: &Settings) -> Result<Arc<dyn UserRepository>> {
    let Some(database) = &settings.database else {
        return Ok(Arc::new(InMemoryUserRepository::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&database.url)
        .await
        .context("Failed to connect to database")?;

    let repository = PgUserRepository::new(pool);
    repository
        .migrate()
        .await
        .context("Failed to run database migrations")?;

    info!(max_connections = database.max_connections, "Connected to user store");
    Ok(Arc::new(repository))
}
