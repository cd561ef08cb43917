//! Remote Sync Client: snapshot fetch and move command over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::models::{CardId, ColumnId};
use super::payload::{MoveRequest, MoveResponse, ParsedBoard, parse_board};
use crate::errors::{GENERIC_MOVE_ERROR, SyncError};

pub const BOARD_PATH: &str = "/api/admin/workflow/board/";
pub const MOVE_PATH: &str = "/api/admin/workflow/move/";

/// Backend operations the board depends on.
#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Fetch the authoritative snapshot. Cards that fail validation are
    /// filtered, not fatal.
    async fn fetch_board(&self) -> Result<ParsedBoard, SyncError>;

    /// Issue the authoritative move command.
    async fn move_card(
        &self,
        card_id: &CardId,
        target_column: ColumnId,
        target_index: usize,
    ) -> Result<(), SyncError>;
}

/// `BoardApi` over the shop's REST endpoints.
#[derive(Clone)]
pub struct HttpBoardClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBoardClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("shopflow/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl BoardApi for HttpBoardClient {
    async fn fetch_board(&self) -> Result<ParsedBoard, SyncError> {
        let resp = self.client.get(self.url(BOARD_PATH)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = resp.json().await?;
        let parsed = parse_board(&value)?;
        if parsed.dropped > 0 {
            debug!(dropped = parsed.dropped, "snapshot contained cards that are not ready");
        }
        Ok(parsed)
    }

    async fn move_card(
        &self,
        card_id: &CardId,
        target_column: ColumnId,
        target_index: usize,
    ) -> Result<(), SyncError> {
        let body = MoveRequest {
            card_id: card_id.clone(),
            target_column: target_column.as_str().to_string(),
            target_index: i64::try_from(target_index).unwrap_or(i64::MAX),
        };
        let resp = self
            .client
            .post(self.url(MOVE_PATH))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();

        // The reply body decides the outcome; error statuses still carry
        // `{ success: false, error }`.
        let text = resp.text().await?;
        let reply = serde_json::from_str::<Value>(&text)
            .map(|v| MoveResponse::from_value(&v))
            .unwrap_or_else(|_| MoveResponse {
                success: false,
                error: None,
            });

        if reply.success {
            return Ok(());
        }
        let message = reply
            .error
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| GENERIC_MOVE_ERROR.to_string());
        warn!(card_id = %card_id, status = status.as_u16(), error = %message, "move rejected");
        Err(SyncError::MoveRejected { message })
    }
}
