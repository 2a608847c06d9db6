//! Remote document fetching shared by the server engine and the sync client.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::model::ConfigDocument;

/// Client identifier sent with every fetch; sources key their output format on it.
pub const CLIENT_USER_AGENT: &str = "Clash";

/// Response header carrying the accounting string.
pub const USERINFO_HEADER: &str = "subscription-userinfo";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("source returned {0}")]
    Status(StatusCode),

    #[error("malformed document: {0}")]
    Decode(#[from] serde_yaml::Error),
}

/// A decoded document plus the accounting header, if the source sent one.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub document: ConfigDocument,
    pub userinfo: Option<String>,
}

/// Build a fetch client with the given overall request timeout.
pub fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(CLIENT_USER_AGENT)
        .build()?)
}

/// GET `url` and decode the body as a configuration document.
pub async fn fetch_document(client: &Client, url: &str) -> Result<FetchedDocument, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let userinfo = userinfo(response.headers());
    let body = response.text().await?;
    let document = ConfigDocument::from_yaml(&body)?;
    Ok(FetchedDocument { document, userinfo })
}

fn userinfo(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USERINFO_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
