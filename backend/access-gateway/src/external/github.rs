use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{IdentityResolver, RemoteIdentity, ResolveError};

pub const PROVIDER: &str = "github";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "coursegate-access-gateway";

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
}

/// Resolves GitHub personal access tokens through `GET /user`.
#[derive(Debug, Clone)]
pub struct GitHubIdentityResolver {
    client: Client,
    api_base: String,
}

impl GitHubIdentityResolver {
    pub fn new(api_base: impl Into<String>) -> Result<Self, ResolveError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityResolver for GitHubIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<RemoteIdentity, ResolveError> {
        let response = self
            .client
            .get(format!("{}/user", self.api_base))
            .bearer_auth(token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(ResolveError::Rejected),
            status => {
                warn!(status = %status, "Unexpected status from GitHub user lookup");
                return Err(ResolveError::InvalidResponse(format!("status {status}")));
            }
        }

        let user: GitHubUser = response
            .json()
            .await
            .map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;

        debug!(login = %user.login, remote_id = user.id, "Resolved GitHub identity");
        Ok(RemoteIdentity {
            provider: PROVIDER.to_string(),
            remote_id: user.id,
        })
    }
}
