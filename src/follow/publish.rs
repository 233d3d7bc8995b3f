//! Webhook publisher.
//!
//! A single operation: POST the follow-update document as JSON to the
//! follow's webhook URL. No retries live here, and callers never await
//! delivery for tick success: the reconciler fires these off and only logs
//! failures.
//!
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::follow::error::Result;
use crate::follow::ports::{FollowUpdate, Publisher};

/// One-shot webhook POST of follow-update documents.
pub struct WebhookPublisher {
    client: reqwest::Client,
}

impl Default for WebhookPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookPublisher {
    pub fn new() -> Self {
        Self {
            // Default timeout for I/O operations: 10 seconds
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish_follow_update(&self, update: FollowUpdate) -> Result<()> {
        let url = &update.follow.webhook_url;
        if url.is_empty() {
            debug!(follow_id = %update.follow.id, "no webhook URL, skipping publish");
            return Ok(());
        }

        self.client
            .post(url)
            .json(&update)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::follow::model::{Follow, FollowStatus};

    fn update_for(url: &str) -> FollowUpdate {
        FollowUpdate {
            follow: Follow {
                id: "f-1".to_string(),
                status: FollowStatus::Active,
                pair: "BTC-USDT".parse().unwrap(),
                interval: "4h".to_string(),
                exchange_hash: "abc".to_string(),
                webhook_url: url.to_string(),
                order_ids: vec![],
            },
            orders: vec![],
        }
    }

    #[tokio::test]
    async fn test_publish_posts_json_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "follow": {"id": "f-1", "status": "ACTIVE"}
            })))
            .with_status(200)
            .create_async()
            .await;

        let publisher = WebhookPublisher::new();
        let url = format!("{}/hook", server.url());
        publisher
            .publish_follow_update(update_for(&url))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_publish_fails_on_4xx_and_5xx() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let publisher = WebhookPublisher::new();
        let url = format!("{}/hook", server.url());
        assert!(publisher.publish_follow_update(update_for(&url)).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_skips_empty_url() {
        let publisher = WebhookPublisher::new();
        publisher
            .publish_follow_update(update_for(""))
            .await
            .unwrap();
    }
}
