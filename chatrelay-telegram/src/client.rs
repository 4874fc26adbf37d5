//! Telegram HTTP client

use std::time::Duration;

use async_trait::async_trait;
use chatrelay_core::{Event, UpdateSource};
use reqwest::Client;
use tracing::debug;

use super::error::{check_response, TelegramError};
use super::types::{ApiResponse, Update};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack added on top of the long-poll wait before the request is abandoned
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Telegram Bot API client
///
/// Implements [`UpdateSource`] over `getUpdates`: the relay cursor is passed
/// as `offset`, which also acknowledges every update below it.
pub struct TelegramClient {
    base_url: String,
    client: Client,
}

impl TelegramClient {
    pub fn new(api_url: &str, bot_token: &str) -> Result<Self, TelegramError> {
        if bot_token.is_empty() {
            return Err(TelegramError::InvalidConfig("bot token is empty".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TelegramError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
            client,
        })
    }

    /// Long-poll for updates with `update_id >= offset`
    ///
    /// Telegram holds the request open for up to `timeout` and answers with
    /// an empty list if nothing arrives.
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, TelegramError> {
        let url = format!("{}/getUpdates", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.as_secs().to_string()),
            ])
            .timeout(timeout + REQUEST_TIMEOUT_MARGIN)
            .send()
            .await?;

        let response = check_response(response).await?;
        let bytes = response.bytes().await?;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_slice(&bytes)?;

        if !resp.ok {
            return Err(TelegramError::Api {
                code: resp.error_code.unwrap_or_default(),
                description: resp
                    .description
                    .unwrap_or_else(|| "telegram API returned not OK".to_string()),
            });
        }

        let updates = resp.result.unwrap_or_default();
        debug!(offset, count = updates.len(), "Fetched updates");
        Ok(updates)
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn fetch(&self, cursor: i64, timeout: Duration) -> chatrelay_core::Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .get_updates(cursor, timeout)
            .await?
            .into_iter()
            .map(Event::from)
            .collect();
        events.sort_by_key(|event| event.sequence_id);
        Ok(events)
    }
}
