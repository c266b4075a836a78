//! HTTP Provider Client
//!
//! Production [`ProviderClient`] speaking the provider's OAuth and page API.
//! All calls share one pooled `reqwest` client with a hard timeout; there are
//! no retries here, callers decide how failures feed the connection lifecycle.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use tracing::warn;
use url::Url;

use crate::config::Config;

use super::{ProviderClient, ProviderError, RefreshGrant, TokenGrant};

/// Fallback token lifetime when the provider omits `expires_in` (60 days,
/// the provider's documented long-lived token lifetime).
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 60 * 86_400;

pub struct HttpProviderClient {
    http: reqwest::Client,
    authorize_base: Url,
    api_base: String,
    app_id: String,
    app_secret: String,
    redirect_uri: String,
}

impl HttpProviderClient {
    /// Build a client from server configuration.
    ///
    /// # Errors
    /// Returns an error if the configured provider URLs are malformed.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let authorize_base = Url::parse(&config.provider_authorize_url)
            .context("PROVIDER_AUTHORIZE_URL is not a valid URL")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()
            .context("Failed to build provider HTTP client")?;

        Ok(Self {
            http,
            authorize_base,
            api_base: config.provider_api_base.trim_end_matches('/').to_string(),
            app_id: config.provider_app_id.clone(),
            app_secret: config.provider_app_secret.clone(),
            redirect_uri: format!(
                "{}/connect/callback",
                config.public_url.trim_end_matches('/')
            ),
        })
    }

    /// Classify a token endpoint response and pull out the grant fields.
    ///
    /// Logs the provider's `error`/`error_description` fields only, never the
    /// full body, which would contain the access token on success.
    async fn parse_token_response(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<serde_json::Value, ProviderError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(operation, "Provider rate limited the token request");
            return Err(ProviderError::RateLimited);
        }
        if status.is_server_error() {
            warn!(operation, status = %status, "Provider token endpoint returned a server error");
            return Err(ProviderError::NetworkFailure);
        }

        let token_unusable = status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;

        let body: serde_json::Value = response.json().await.map_err(|e| {
            warn!(operation, error = %e, "Provider token response was not valid JSON");
            ProviderError::NetworkFailure
        })?;

        if body.get("access_token").and_then(|v| v.as_str()).is_some() {
            return Ok(body);
        }

        let code = body["error"].as_str().unwrap_or("unknown");
        let description = body["error_description"].as_str().unwrap_or("");
        warn!(
            operation,
            status = %status,
            provider_error = code,
            provider_detail = description,
            "Provider rejected the token request"
        );

        if token_unusable || code == "invalid_token" || code == "token_expired" {
            return Err(ProviderError::TokenInvalid);
        }
        match code {
            "rate_limited" | "slow_down" => Err(ProviderError::RateLimited),
            _ => Err(ProviderError::InvalidGrant),
        }
    }

    fn expires_at_from(body: &serde_json::Value) -> chrono::DateTime<Utc> {
        let lifetime = body["expires_in"]
            .as_i64()
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Utc::now() + chrono::Duration::seconds(lifetime)
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn authorize_url(&self, state: &str, nonce: &str) -> String {
        let mut url = self.authorize_base.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.app_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "pages_messaging")
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        url.to_string()
    }

    #[tracing::instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", self.api_base))
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Provider token exchange request failed");
                ProviderError::NetworkFailure
            })?;

        let body = Self::parse_token_response(response, "exchange_code").await?;

        let access_token = body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or(ProviderError::NetworkFailure)?;
        let expires_at = Self::expires_at_from(&body);

        let (external_page_id, page_name) = match (
            body["page"]["id"].as_str(),
            body["page"]["name"].as_str(),
        ) {
            (Some(id), Some(name)) => (id.to_string(), name.to_string()),
            _ => {
                warn!("Provider token response is missing the page object");
                return Err(ProviderError::NetworkFailure);
            }
        };

        Ok(TokenGrant {
            access_token,
            expires_at,
            external_page_id,
            page_name,
        })
    }

    #[tracing::instrument(skip(self, current_token))]
    async fn refresh_token(&self, current_token: &str) -> Result<RefreshGrant, ProviderError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", self.api_base))
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("access_token", current_token),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Provider token refresh request failed");
                ProviderError::NetworkFailure
            })?;

        let body = Self::parse_token_response(response, "refresh_token").await?;

        let access_token = body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or(ProviderError::NetworkFailure)?;

        Ok(RefreshGrant {
            access_token,
            expires_at: Self::expires_at_from(&body),
        })
    }

    #[tracing::instrument(skip(self, access_token))]
    async fn subscribe_webhooks(
        &self,
        external_page_id: &str,
        access_token: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(format!(
                "{}/pages/{external_page_id}/subscribed_apps",
                self.api_base
            ))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "subscribed_fields": ["messages", "messaging_postbacks"]
            }))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Provider webhook subscription request failed");
                ProviderError::NetworkFailure
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        warn!(status = %status, "Provider declined the webhook subscription");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::TokenInvalid),
            StatusCode::NOT_FOUND => Err(ProviderError::PageNotFound),
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited),
            _ => Err(ProviderError::NetworkFailure),
        }
    }
}
