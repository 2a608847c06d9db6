//! `GET /sub` handler.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::config::SubscriptionConfig;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::subscription::fetch::USERINFO_HEADER;

const YAML_CONTENT_TYPE: &str = "application/yaml; charset=utf-8";

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub async fn subscription_handler(State(state): State<AppState>) -> Response {
    let (document, userinfo) = match state.service.generate_config().await {
        Ok(generated) => generated,
        Err(e) => {
            tracing::error!(error = %e, "Failed to generate configuration");
            return internal_error();
        }
    };

    let body = match document.to_yaml() {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode configuration");
            return internal_error();
        }
    };

    metrics::record_subscription_request(StatusCode::OK.as_u16());
    (
        StatusCode::OK,
        client_headers(&state.subscription, &userinfo),
        body,
    )
        .into_response()
}

fn internal_error() -> Response {
    metrics::record_subscription_request(StatusCode::INTERNAL_SERVER_ERROR.as_u16());
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to generate configuration",
    )
}

/// Headers proxy clients read for file naming, refresh period and usage.
fn client_headers(config: &SubscriptionConfig, userinfo: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(YAML_CONTENT_TYPE));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename={}", config.filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        HeaderName::from_static("profile-update-interval"),
        HeaderValue::from(config.update_interval),
    );
    if !config.profile_url.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&config.profile_url) {
            headers.insert(HeaderName::from_static("profile-web-page-url"), value);
        }
    }
    if !userinfo.is_empty() {
        if let Ok(value) = HeaderValue::from_str(userinfo) {
            headers.insert(HeaderName::from_static(USERINFO_HEADER), value);
        }
    }
    headers
}
