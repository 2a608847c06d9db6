use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::http::server::AppState;
use crate::http::subscription::error_response;
use crate::observability::metrics;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Reject requests whose `token` query parameter is missing or unknown.
pub async fn token_auth(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    request: Request,
    next: Next,
) -> Response {
    let token = query.token.unwrap_or_default();
    if token.is_empty() {
        metrics::record_subscription_request(StatusCode::UNAUTHORIZED.as_u16());
        return error_response(StatusCode::UNAUTHORIZED, "Missing subscription token");
    }

    if !state.service.validate_token(&token) {
        tracing::warn!("Rejected invalid subscription token");
        metrics::record_subscription_request(StatusCode::UNAUTHORIZED.as_u16());
        return error_response(StatusCode::UNAUTHORIZED, "Invalid subscription token");
    }

    next.run(request).await
}
