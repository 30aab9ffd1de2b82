//! Shared plumbing for index and document store clients.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by backend clients, real or in-memory.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("DynamoDB error: {0}")]
    DynamoDb(Box<dyn std::error::Error + Send + Sync>),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for backend client calls.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Build the HTTP client shared by the REST-based backends.
pub fn http_client(timeout: Duration) -> ClientResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("lakeside/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Turn a non-success response into [`ClientError::Status`], keeping the body
/// for diagnostics.
pub async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body: truncate(body, 1024),
    })
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
