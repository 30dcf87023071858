//! Discord REST client.
//!
//! A thin typed layer over `reqwest`. Every call is addressed by path
//! segments so user-supplied IDs are percent-encoded, never spliced into
//! the URL. Rate-limited (429) responses are retried after the delay
//! Discord asks for; nothing else is retried here.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::DiscordConfig;
use crate::error::{Error, Result};
use crate::types::{
    ApiErrorBody, Channel, CreateRole, Guild, Invite, ModifyRole, RateLimitBody, Role, Webhook,
};

/// Fallback wait when a 429 carries no usable delay.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Upper bound on a single rate-limit wait.
const MAX_RETRY_AFTER_SECS: f64 = 300.0;

/// Client for the Discord REST API, authenticated as a bot.
#[derive(Clone)]
pub struct DiscordClient {
    /// Configuration for the client.
    config: Arc<DiscordConfig>,
    /// Parsed API root, always ending in `/`.
    api_root: Url,
    /// Bot token, sent as `Authorization: Bot <token>`.
    token: Arc<str>,
    /// Shared HTTP connection pool.
    http_client: reqwest::Client,
}

impl fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_root", &self.api_root.as_str())
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    /// Create a client with the default configuration.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_config(token, DiscordConfig::default())
    }

    /// Create a client with a custom configuration.
    pub fn with_config(token: impl Into<String>, config: DiscordConfig) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::config_error("bot token is empty"));
        }

        let api_root = config.api_root()?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            api_root,
            token: Arc::from(token.trim()),
            http_client,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &DiscordConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// `GET /guilds/{guild}/roles/{role}`
    pub async fn get_role(&self, guild_id: &str, role_id: &str) -> Result<Role> {
        self.call(Method::GET, &["guilds", guild_id, "roles", role_id], None::<&()>)
            .await
    }

    /// `GET /guilds/{guild}/roles`
    pub async fn list_roles(&self, guild_id: &str) -> Result<Vec<Role>> {
        self.call(Method::GET, &["guilds", guild_id, "roles"], None::<&()>)
            .await
    }

    /// `POST /guilds/{guild}/roles`
    pub async fn create_role(&self, guild_id: &str, request: &CreateRole) -> Result<Role> {
        self.call(Method::POST, &["guilds", guild_id, "roles"], Some(request))
            .await
    }

    /// `PATCH /guilds/{guild}/roles/{role}`
    pub async fn modify_role(
        &self,
        guild_id: &str,
        role_id: &str,
        request: &ModifyRole,
    ) -> Result<Role> {
        self.call(
            Method::PATCH,
            &["guilds", guild_id, "roles", role_id],
            Some(request),
        )
        .await
    }

    /// `DELETE /guilds/{guild}/roles/{role}`
    pub async fn delete_role(&self, guild_id: &str, role_id: &str) -> Result<()> {
        self.send(
            Method::DELETE,
            &["guilds", guild_id, "roles", role_id],
            None::<&()>,
        )
        .await
        .map(drop)
    }

    // ------------------------------------------------------------------
    // Guild introspection
    // ------------------------------------------------------------------

    /// `GET /guilds/{guild}`
    pub async fn get_guild(&self, guild_id: &str) -> Result<Guild> {
        self.call(Method::GET, &["guilds", guild_id], None::<&()>)
            .await
    }

    /// `GET /guilds/{guild}/channels`
    pub async fn list_channels(&self, guild_id: &str) -> Result<Vec<Channel>> {
        self.call(Method::GET, &["guilds", guild_id, "channels"], None::<&()>)
            .await
    }

    /// `DELETE /channels/{channel}`
    pub async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        self.send(Method::DELETE, &["channels", channel_id], None::<&()>)
            .await
            .map(drop)
    }

    /// `GET /guilds/{guild}/webhooks`
    pub async fn list_webhooks(&self, guild_id: &str) -> Result<Vec<Webhook>> {
        self.call(Method::GET, &["guilds", guild_id, "webhooks"], None::<&()>)
            .await
    }

    /// `GET /guilds/{guild}/invites`
    pub async fn list_invites(&self, guild_id: &str) -> Result<Vec<Invite>> {
        self.call(Method::GET, &["guilds", guild_id, "invites"], None::<&()>)
            .await
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Send a request and decode the JSON response body.
    async fn call<T, B>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.send(method, segments, body).await?;
        Ok(response.json().await?)
    }

    /// Send a request, retrying on 429, and map failures to typed errors.
    async fn send<B>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        let mut attempt = 0u32;

        loop {
            debug!(method = %method, path = %path, attempt, "Discord request");

            let mut request = self
                .http_client
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, format!("Bot {}", self.token));
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after(response).await;
                if attempt >= self.config.max_retries {
                    return Err(Error::RateLimited {
                        path,
                        retry_after_ms: u64::try_from(retry_after.as_millis())
                            .unwrap_or(u64::MAX),
                    });
                }
                attempt = attempt.saturating_add(1);
                warn!(
                    path = %path,
                    attempt,
                    retry_after_ms = retry_after.as_millis(),
                    "Rate limited by Discord, waiting"
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            return Err(error_for(status, path, response).await);
        }
    }

    /// Build an endpoint URL below the API root.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_root.clone();
        url.path_segments_mut()
            .map_err(|()| Error::config_error("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Read the wait time out of a 429, preferring the JSON body.
async fn retry_after(response: Response) -> Duration {
    let header = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());

    let body = response
        .json::<RateLimitBody>()
        .await
        .ok()
        .map(|b| b.retry_after);

    body.or(header)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map_or(DEFAULT_RETRY_AFTER, |secs| {
            Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER_SECS))
        })
}

/// Turn a non-success response into a typed error.
async fn error_for(status: StatusCode, path: String, response: Response) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound { path },
        StatusCode::UNAUTHORIZED => Error::Unauthorized,
        _ => {
            let text = response.text().await.unwrap_or_default();
            let (code, message) = serde_json::from_str::<ApiErrorBody>(&text)
                .map_or((0, text), |body| (body.code, body.message));
            Error::Api {
                status,
                path,
                code,
                message,
            }
        }
    }
}
