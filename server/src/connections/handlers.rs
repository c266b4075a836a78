//! Connection HTTP Handlers

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Json,
};
use tracing::warn;
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::db::PageConnection;

use super::error::{ConnectError, ConnectResult};
use super::types::{
    CallbackQuery, PageConnectionResponse, PageListResponse, ResubscribeResponse,
    StartConnectionRequest, StartConnectionResponse,
};

/// Owner or admin may operate on a connection; everyone else only reads.
fn ensure_can_manage(user: &AuthUser, connection: &PageConnection) -> ConnectResult<()> {
    if user.is_admin || user.id == connection.owner_id {
        Ok(())
    } else {
        Err(ConnectError::Forbidden)
    }
}

/// Parse the page id path segment.
fn parse_page_id(raw: &str) -> ConnectResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ConnectError::MissingPageId)
}

/// Start the authorization handshake for a page.
#[utoipa::path(
    post,
    path = "/connect/start",
    tag = "connections",
    request_body = StartConnectionRequest,
    responses(
        (status = 200, description = "Handshake started", body = StartConnectionResponse),
        (status = 400, description = "Missing or invalid page URL"),
    ),
)]
#[tracing::instrument(skip(state, request))]
pub async fn start_connection(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<StartConnectionRequest>,
) -> ConnectResult<Json<StartConnectionResponse>> {
    if request.page_url.trim().is_empty() {
        return Err(ConnectError::MissingPageUrl);
    }
    request
        .validate()
        .map_err(|_| ConnectError::InvalidPageUrl(request.page_url.clone()))?;

    let started = state
        .connections
        .start_connection(user.id, &request.page_url)
        .await?;

    Ok(Json(StartConnectionResponse {
        success: true,
        authorize_url: started.authorize_url,
    }))
}

/// Provider redirect target completing the handshake.
///
/// Unauthenticated: the browser arrives here from the provider, and the
/// claimed session supplies the owner. Every outcome ends in a redirect to
/// the dashboard result screen; provider error bodies are logged, never
/// forwarded.
#[utoipa::path(
    get,
    path = "/connect/callback",
    tag = "connections",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Redirect to the dashboard result screen"),
    ),
)]
#[tracing::instrument(skip(state, query))]
pub async fn connect_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    if let Some(provider_error) = query.error.as_deref() {
        warn!(
            provider_error,
            provider_detail = query.error_description.as_deref().unwrap_or(""),
            "Provider returned an error to the handshake callback"
        );
        let message = if provider_error == "access_denied" {
            "The connection request was declined"
        } else {
            "The provider reported an error"
        };
        return result_redirect(&state.config.dashboard_url, &[("error", message)]);
    }

    let (Some(code), Some(state_token)) = (query.code.as_deref(), query.state.as_deref()) else {
        warn!("Handshake callback is missing code or state");
        return result_redirect(
            &state.config.dashboard_url,
            &[("error", "Invalid authorization callback")],
        );
    };

    match state.connections.complete_connection(code, state_token).await {
        Ok(connection) => {
            let page = PageConnectionResponse::from(connection);
            let page_json = serde_json::to_string(&page).unwrap_or_default();
            result_redirect(
                &state.config.dashboard_url,
                &[("success", "true"), ("page", &page_json)],
            )
        }
        Err(e) => {
            warn!(error = %e, "Handshake completion failed");
            result_redirect(&state.config.dashboard_url, &[("error", &e.to_string())])
        }
    }
}

/// Build the redirect to the dashboard result screen with query params.
fn result_redirect(dashboard_url: &str, params: &[(&str, &str)]) -> Redirect {
    let base = format!("{}/connect/result", dashboard_url.trim_end_matches('/'));
    match Url::parse(&base) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params);
            Redirect::to(url.as_str())
        }
        // Unparseable dashboard URL: redirect without params rather than 500
        // in the middle of the provider's browser flow.
        Err(_) => Redirect::to(&base),
    }
}

/// List all page connections.
#[utoipa::path(
    get,
    path = "/pages",
    tag = "connections",
    responses(
        (status = 200, description = "All page connections", body = PageListResponse),
    ),
)]
#[tracing::instrument(skip(state, _user))]
pub async fn list_pages(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ConnectResult<Json<PageListResponse>> {
    let pages = state
        .connections
        .list()
        .await?
        .into_iter()
        .map(PageConnectionResponse::from)
        .collect();
    Ok(Json(PageListResponse { pages }))
}

/// Fetch one page connection.
#[utoipa::path(
    get,
    path = "/pages/{id}",
    tag = "connections",
    responses(
        (status = 200, description = "The page connection", body = PageConnectionResponse),
        (status = 404, description = "Connection not found"),
    ),
)]
#[tracing::instrument(skip(state, _user))]
pub async fn get_page(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(page_id): Path<String>,
) -> ConnectResult<Json<PageConnectionResponse>> {
    let page_id = parse_page_id(&page_id)?;
    let connection = state.connections.get(page_id).await?;
    Ok(Json(PageConnectionResponse::from(connection)))
}

/// Refresh the access token of a connection.
#[utoipa::path(
    post,
    path = "/pages/{id}/refresh",
    tag = "connections",
    responses(
        (status = 200, description = "Token refreshed", body = PageConnectionResponse),
        (status = 404, description = "Connection not found"),
        (status = 409, description = "Connection revoked"),
        (status = 502, description = "Provider unreachable"),
    ),
)]
#[tracing::instrument(skip(state, user))]
pub async fn refresh_page(
    State(state): State<AppState>,
    user: AuthUser,
    Path(page_id): Path<String>,
) -> ConnectResult<Json<PageConnectionResponse>> {
    let page_id = parse_page_id(&page_id)?;
    let connection = state.connections.get(page_id).await?;
    ensure_can_manage(&user, &connection)?;

    let refreshed = state.connections.refresh_connection(page_id).await?;
    Ok(Json(PageConnectionResponse::from(refreshed)))
}

/// Retry the webhook subscription for a connection.
#[utoipa::path(
    post,
    path = "/pages/{id}/resubscribe",
    tag = "connections",
    responses(
        (status = 200, description = "Subscription outcome", body = ResubscribeResponse),
        (status = 404, description = "Connection not found"),
        (status = 409, description = "Connection revoked"),
    ),
)]
#[tracing::instrument(skip(state, user))]
pub async fn resubscribe_page(
    State(state): State<AppState>,
    user: AuthUser,
    Path(page_id): Path<String>,
) -> ConnectResult<Json<ResubscribeResponse>> {
    let page_id = parse_page_id(&page_id)?;
    let connection = state.connections.get(page_id).await?;
    ensure_can_manage(&user, &connection)?;

    let outcome = state.webhooks.resubscribe(page_id).await?;
    Ok(Json(match outcome.error {
        None => ResubscribeResponse::subscribed(),
        Some(e) => ResubscribeResponse::failed(e),
    }))
}

/// Revoke a connection. Idempotent.
#[utoipa::path(
    post,
    path = "/pages/{id}/revoke",
    tag = "connections",
    responses(
        (status = 200, description = "Connection revoked", body = PageConnectionResponse),
        (status = 404, description = "Connection not found"),
    ),
)]
#[tracing::instrument(skip(state, user))]
pub async fn revoke_page(
    State(state): State<AppState>,
    user: AuthUser,
    Path(page_id): Path<String>,
) -> ConnectResult<Json<PageConnectionResponse>> {
    let page_id = parse_page_id(&page_id)?;
    let connection = state.connections.get(page_id).await?;
    ensure_can_manage(&user, &connection)?;

    let revoked = state.connections.revoke(page_id).await?;
    Ok(Json(PageConnectionResponse::from(revoked)))
}
