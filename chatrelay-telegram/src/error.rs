//! Telegram client error types

use thiserror::Error;

/// Longest slice of an error body kept in [`TelegramError::Http`]
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: reqwest::StatusCode, body: String },

    #[error("API error (code {code}): {description}")]
    Api { code: i64, description: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Turn a non-2xx response into [`TelegramError::Http`], keeping a bounded
/// prefix of the body for the log line.
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, TelegramError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    Err(TelegramError::Http { status, body })
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL embeds the bot token
        Self::Network(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for TelegramError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<TelegramError> for chatrelay_core::Error {
    fn from(err: TelegramError) -> Self {
        Self::Source(err.to_string())
    }
}
