//! Chat webhook delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::NotifierConfig;
use crate::errors::{Result, WatchdogError};
use crate::http::{HttpClient, HttpOptions};

const WEBHOOK_PATH: &str = "/cgi-bin/webhook/send";

/// Delivers a report to humans.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `content` as a markdown message.
    async fn send_markdown(&self, content: &str) -> Result<()>;
}

/// Markdown message body of the WeChat Work group robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownMessage<'a> {
    /// Always `"markdown"`.
    pub msgtype: &'static str,
    /// Message content.
    pub markdown: MarkdownContent<'a>,
}

/// Markdown payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownContent<'a> {
    /// Markdown text.
    pub content: &'a str,
}

impl<'a> MarkdownMessage<'a> {
    /// Wraps `content` in a markdown message.
    #[must_use]
    pub fn new(content: &'a str) -> Self {
        Self {
            msgtype: "markdown",
            markdown: MarkdownContent { content },
        }
    }
}

/// Webhook acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookResponse {
    /// Zero on success.
    #[serde(default)]
    pub errcode: i64,
    /// Human-readable status.
    #[serde(default)]
    pub errmsg: String,
}

impl WebhookResponse {
    /// Fails unless the webhook accepted the message.
    pub fn into_result(self) -> Result<()> {
        if self.errcode == 0 {
            Ok(())
        } else {
            Err(WatchdogError::Notify(format!(
                "errcode {}: {}",
                self.errcode, self.errmsg
            )))
        }
    }
}

/// [`Notifier`] posting to a WeChat Work group robot.
pub struct WebhookNotifier {
    client: HttpClient,
    key: String,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("base_url", &self.client.base_url().as_str())
            .field("key", &"***")
            .finish()
    }
}

impl WebhookNotifier {
    /// Creates a notifier for the configured webhook.
    pub fn new(config: &NotifierConfig, options: &HttpOptions) -> Result<Self> {
        Ok(Self {
            client: HttpClient::with_options(&config.base_url, &[], options)?,
            key: config.key.clone(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_markdown(&self, content: &str) -> Result<()> {
        let response = self
            .client
            .post_json_with_query(
                WEBHOOK_PATH,
                &[("key", self.key.as_str())],
                &MarkdownMessage::new(content),
            )
            .await?;

        let ack: WebhookResponse = HttpClient::json_or_error(response).await?;
        ack.into_result()?;
        info!(bytes = content.len(), "Report delivered");
        Ok(())
    }
}
