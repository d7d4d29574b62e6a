//! HTTP implementation of CatalogBackend

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::PluginConfig;
use crate::data::{
    BackendError, CatalogDraft, CatalogItem, CategoryFilter, HexiesError, HexiesResult,
    HostIdentity, ItemId, SubscriptionRecord, UserProfile,
};
use crate::traits::{AccessToken, AuthGrant, CatalogBackend, UsageEvent};

/// Token lifetime assumed when the backend does not state one.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 60 * 60;

/// Configuration for the remote backend client
#[derive(Debug, Clone)]
pub struct RemoteBackendConfig {
    /// Base URL including the API prefix, e.g. `https://api.example.com/api`
    pub base_url: String,
    /// Timeout for each HTTP request
    pub timeout: Duration,
}

impl From<&PluginConfig> for RemoteBackendConfig {
    fn from(config: &PluginConfig) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            timeout: config.request_timeout(),
        }
    }
}

/// HTTP client for the Hexies backend
#[derive(Debug, Clone)]
pub struct RemoteBackendClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    miro_user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    board_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
    #[serde(default, alias = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
    /// Seconds until expiry, used when `expires_at` is absent
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<i64>,
    user: UserProfile,
    #[serde(default)]
    subscription: Option<SubscriptionRecord>,
}

#[derive(Debug, Serialize)]
struct TrackRequest<'a> {
    event: &'a str,
    properties: &'a serde_json::Value,
}

/// Responses either come bare or wrapped in a named field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemsResponse {
    Wrapped { hexies: Vec<CatalogItem> },
    Bare(Vec<CatalogItem>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemResponse {
    Wrapped { hexie: CatalogItem },
    Bare(CatalogItem),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubscriptionResponse {
    Wrapped { subscription: SubscriptionRecord },
    Bare(SubscriptionRecord),
}

impl RemoteBackendClient {
    pub fn new(config: RemoteBackendConfig) -> HexiesResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HexiesError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Maps a transport error to a BackendError
    fn map_http_error(error: reqwest::Error) -> BackendError {
        if error.is_timeout() {
            BackendError::Unreachable(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            BackendError::Unreachable(format!("Connection error: {}", error))
        } else if error.is_decode() {
            BackendError::InvalidResponse(error.to_string())
        } else {
            BackendError::Unreachable(format!("HTTP error: {}", error))
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await.map_err(Self::map_http_error)?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(BackendError::Unauthorized),
            StatusCode::FORBIDDEN => Err(BackendError::Forbidden(body_text(response).await)),
            StatusCode::NOT_FOUND => Err(BackendError::NotFound(body_text(response).await)),
            status => Err(BackendError::Status {
                status: status.as_u16(),
                message: body_text(response).await,
            }),
        }
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, BackendError> {
        Self::send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    async fn grant_from(&self, response: AuthResponse) -> Result<AuthGrant, BackendError> {
        let token = AccessToken::new(response.token);
        let expires_at = response.expires_at.unwrap_or_else(|| {
            let secs = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
            Utc::now() + chrono::Duration::seconds(secs)
        });
        let subscription = match response.subscription {
            Some(subscription) => subscription,
            None => self.get_subscription(&token).await?,
        };

        Ok(AuthGrant {
            token,
            expires_at,
            user: response.user,
            subscription,
        })
    }
}

async fn body_text(response: Response) -> String {
    let status = response.status();
    response
        .text()
        .await
        .ok()
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| format!("HTTP error: {}", status))
}

#[async_trait]
impl CatalogBackend for RemoteBackendClient {
    #[instrument(skip(self, identity), fields(host_user_id = %identity.host_user_id))]
    async fn authenticate(&self, identity: &HostIdentity) -> Result<AuthGrant, BackendError> {
        let request = AuthRequest {
            miro_user_id: &identity.host_user_id,
            name: identity.name.as_deref(),
            email: identity.email.as_deref(),
            board_id: identity.board_id.as_deref(),
        };
        let response: AuthResponse =
            Self::send_json(self.client.post(self.url("/auth/miro")).json(&request)).await?;
        self.grant_from(response).await
    }

    #[instrument(skip_all)]
    async fn refresh_token(&self, token: &AccessToken) -> Result<AuthGrant, BackendError> {
        let response: AuthResponse = Self::send_json(
            self.client
                .post(self.url("/auth/refresh"))
                .bearer_auth(token.as_str()),
        )
        .await?;
        self.grant_from(response).await
    }

    #[instrument(skip_all)]
    async fn get_subscription(
        &self,
        token: &AccessToken,
    ) -> Result<SubscriptionRecord, BackendError> {
        let response: SubscriptionResponse = Self::send_json(
            self.client
                .get(self.url("/subscriptions/current"))
                .bearer_auth(token.as_str()),
        )
        .await?;
        Ok(match response {
            SubscriptionResponse::Wrapped { subscription } => subscription,
            SubscriptionResponse::Bare(subscription) => subscription,
        })
    }

    #[instrument(skip(self, token))]
    async fn list_catalog_items(
        &self,
        token: &AccessToken,
        filter: CategoryFilter,
    ) -> Result<Vec<CatalogItem>, BackendError> {
        let mut query: Vec<(&str, &str)> = vec![("includeUser", "true")];
        if let Some(category) = filter.category() {
            query.push(("category", category.as_str()));
        }

        let response: ItemsResponse = Self::send_json(
            self.client
                .get(self.url("/hexies"))
                .query(&query)
                .bearer_auth(token.as_str()),
        )
        .await?;
        let items = match response {
            ItemsResponse::Wrapped { hexies } => hexies,
            ItemsResponse::Bare(hexies) => hexies,
        };
        debug!(count = items.len(), "Fetched catalog items");
        Ok(items)
    }

    #[instrument(skip(self, token, draft), fields(title = %draft.title))]
    async fn create_catalog_item(
        &self,
        token: &AccessToken,
        draft: &CatalogDraft,
    ) -> Result<CatalogItem, BackendError> {
        let response: ItemResponse = Self::send_json(
            self.client
                .post(self.url("/hexies"))
                .json(draft)
                .bearer_auth(token.as_str()),
        )
        .await?;
        Ok(match response {
            ItemResponse::Wrapped { hexie } => hexie,
            ItemResponse::Bare(hexie) => hexie,
        })
    }

    #[instrument(skip(self, token))]
    async fn delete_catalog_item(&self, token: &AccessToken, id: &ItemId) -> Result<(), BackendError> {
        Self::send(
            self.client
                .delete(self.url(&format!("/hexies/{}", id)))
                .bearer_auth(token.as_str()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, token, event), fields(event_type = %event.event_type))]
    async fn track_event(&self, token: &AccessToken, event: UsageEvent) -> Result<(), BackendError> {
        let body = TrackRequest {
            event: &event.event_type,
            properties: &event.data,
        };
        Self::send(
            self.client
                .post(self.url("/analytics/track"))
                .json(&body)
                .bearer_auth(token.as_str()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn logout(&self, token: &AccessToken) -> Result<(), BackendError> {
        Self::send(
            self.client
                .post(self.url("/auth/logout"))
                .bearer_auth(token.as_str()),
        )
        .await?;
        Ok(())
    }
}
