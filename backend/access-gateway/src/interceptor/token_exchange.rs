use std::sync::Arc;

use async_trait::async_trait;
use cookie::Cookie;
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::Status;
use tracing::debug;

use super::{
    Call, CallResult, Interceptor, Next, AUTHORIZATION_HEADER, COOKIE_HEADER, SET_COOKIE_HEADER,
};
use crate::exchange::TokenExchange;

/// Swaps an external personal access token for a session cookie.
///
/// Only active when the call carries an `authorization` header; browser
/// calls with a cookie pass straight through.
pub struct TokenExchangeInterceptor {
    exchange: Arc<TokenExchange>,
    cookie_name: String,
}

impl TokenExchangeInterceptor {
    pub fn new(exchange: Arc<TokenExchange>, cookie_name: impl Into<String>) -> Self {
        Self {
            exchange,
            cookie_name: cookie_name.into(),
        }
    }
}

#[async_trait]
impl Interceptor for TokenExchangeInterceptor {
    fn name(&self) -> &'static str {
        "token_exchange"
    }

    async fn intercept(&self, mut call: Call, next: Next<'_>) -> CallResult {
        let Some(external_token) = external_token(call.metadata()) else {
            return next.run(call).await;
        };

        let credential = self
            .exchange
            .resolve(&external_token)
            .await
            .map_err(|e| e.to_status())?;

        let cookie = MetadataValue::try_from(format!("{}={}", self.cookie_name, credential))
            .map_err(|_| Status::internal("Internal server error"))?;
        call.metadata_mut().insert(COOKIE_HEADER, cookie);
        debug!(method = %call.method(), "Session cookie injected for external token");

        let result = next.run(call).await;
        let metadata = match &result {
            Ok(response) => response.metadata(),
            Err(status) => status.metadata(),
        };
        if let Some(rotated) = rotated_credential(metadata, &self.cookie_name) {
            self.exchange.update(&external_token, &rotated);
        }
        result
    }
}

/// Token from `authorization`, with or without a `Bearer ` prefix.
fn external_token(metadata: &MetadataMap) -> Option<String> {
    let raw = metadata.get(AUTHORIZATION_HEADER)?.to_str().ok()?.trim_start();
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Credential from a `set-cookie` response header carrying `cookie_name`.
fn rotated_credential(metadata: &MetadataMap, cookie_name: &str) -> Option<String> {
    metadata
        .get_all(SET_COOKIE_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value).ok())
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
}
