//! Connection API Types
//!
//! Wire DTOs for the connection endpoints. The dashboard consumes camelCase
//! JSON. Connection responses are built from [`PageConnection`] rows and by
//! construction never carry the sealed access token.

use chrono::{DateTime, Utc};
use hl_common::{ConnectionStatus, WebhookStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::PageConnection;
use crate::monitor::days_remaining;
use crate::provider::ProviderError;

/// Request body for starting a connection handshake.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartConnectionRequest {
    /// URL of the provider page the recruiter wants to connect.
    #[validate(url(message = "pageUrl must be a valid URL"))]
    pub page_url: String,
}

/// Response for a started handshake.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartConnectionResponse {
    pub success: bool,
    /// Provider URL the browser must visit to authorize the page.
    pub authorize_url: String,
}

/// Query parameters the provider sends to the handshake callback.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A page connection as seen by the dashboard.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageConnectionResponse {
    pub id: Uuid,
    pub external_page_id: String,
    pub page_name: String,
    pub owner_id: Uuid,
    pub status: ConnectionStatus,
    pub webhook_status: WebhookStatus,
    pub obtained_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whole days until the token expires; negative once past due.
    pub days_remaining: i64,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub refresh_failures: i64,
    pub created_at: DateTime<Utc>,
}

impl From<PageConnection> for PageConnectionResponse {
    fn from(conn: PageConnection) -> Self {
        Self {
            id: conn.id,
            external_page_id: conn.external_page_id,
            page_name: conn.page_name,
            owner_id: conn.owner_id,
            status: conn.status,
            webhook_status: conn.webhook_status,
            obtained_at: conn.obtained_at,
            expires_at: conn.expires_at,
            days_remaining: days_remaining(conn.expires_at, Utc::now()),
            last_refreshed_at: conn.last_refreshed_at,
            refresh_failures: conn.refresh_failures,
            created_at: conn.created_at,
        }
    }
}

/// Response for the connection list endpoint.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageListResponse {
    pub pages: Vec<PageConnectionResponse>,
}

/// Outcome of a manual webhook resubscription attempt.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResubscribeResponse {
    pub subscribed: bool,
    /// Failure class when not subscribed, e.g. `rate_limited`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl ResubscribeResponse {
    #[must_use]
    pub const fn subscribed() -> Self {
        Self {
            subscribed: true,
            error: None,
        }
    }

    #[must_use]
    pub const fn failed(error: ProviderError) -> Self {
        Self {
            subscribed: false,
            error: Some(error.wire_code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_row() -> PageConnection {
        PageConnection {
            id: Uuid::now_v7(),
            external_page_id: "page-1001".to_string(),
            page_name: "Acme Careers".to_string(),
            owner_id: Uuid::now_v7(),
            access_token_sealed: "deadbeefcafe0123".to_string(),
            obtained_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(12),
            status: ConnectionStatus::Connected,
            webhook_status: WebhookStatus::Subscribed,
            last_refreshed_at: None,
            last_expiry_bucket: None,
            refresh_failures: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn response_never_contains_the_sealed_token() {
        let row = connection_row();
        let sealed = row.access_token_sealed.clone();

        let json = serde_json::to_string(&PageConnectionResponse::from(row)).unwrap();
        assert!(!json.contains(&sealed));
        assert!(!json.contains("access_token"));
        assert!(!json.contains("accessToken"));
    }

    #[test]
    fn response_uses_camel_case_fields() {
        let json = serde_json::to_value(PageConnectionResponse::from(connection_row())).unwrap();
        assert!(json.get("externalPageId").is_some());
        assert!(json.get("webhookStatus").is_some());
        assert!(json.get("daysRemaining").is_some());
        assert!(json.get("external_page_id").is_none());
    }

    #[test]
    fn start_request_accepts_camel_case() {
        let req: StartConnectionRequest =
            serde_json::from_str(r#"{"pageUrl": "https://pages.example.com/acme"}"#).unwrap();
        assert_eq!(req.page_url, "https://pages.example.com/acme");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn start_request_rejects_non_urls() {
        let req: StartConnectionRequest =
            serde_json::from_str(r#"{"pageUrl": "not a url"}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn resubscribe_failure_carries_wire_code() {
        let json = serde_json::to_value(ResubscribeResponse::failed(ProviderError::RateLimited))
            .unwrap();
        assert_eq!(json["subscribed"], false);
        assert_eq!(json["error"], "rate_limited");

        let ok = serde_json::to_value(ResubscribeResponse::subscribed()).unwrap();
        assert_eq!(ok["subscribed"], true);
        assert!(ok.get("error").is_none());
    }
}
