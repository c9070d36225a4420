use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::credentials::SlackCredentials;
use crate::error::AppError;

/// Display identity attached to outgoing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub icon: String,
}

pub trait Notifier: Send + Sync {
    fn send(
        &self,
        channel: &str,
        text: &str,
        identity: &Identity,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    channel: &'a str,
    text: &'a str,
    icon_emoji: &'a str,
}

/// Posts to a Slack incoming webhook.
pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(credentials: &SlackCredentials, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            http,
            webhook_url: credentials.webhook_url().to_string(),
        })
    }
}

impl Notifier for SlackNotifier {
    async fn send(&self, channel: &str, text: &str, identity: &Identity) -> Result<()> {
        let payload = WebhookPayload {
            username: &identity.username,
            channel,
            text,
            icon_emoji: &identity.icon,
        };
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("webhook request failed: {}", e)))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!(
                "webhook returned {}: {}",
                status, body
            ))
            .into());
        }
        tracing::debug!(channel, "notification delivered");
        Ok(())
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, channel: &str, text: &str, identity: &Identity) -> Result<()> {
        tracing::info!(channel, username = %identity.username, text, "notification");
        Ok(())
    }
}

/// Notifier chosen at startup from the available credentials.
pub enum ChannelNotifier {
    Slack(SlackNotifier),
    Log(LogNotifier),
}

impl ChannelNotifier {
    pub fn from_credentials(slack: Option<SlackCredentials>, timeout: Duration) -> Result<Self> {
        Ok(match slack {
            Some(creds) => Self::Slack(SlackNotifier::new(&creds, timeout)?),
            None => Self::Log(LogNotifier),
        })
    }
}

impl Notifier for ChannelNotifier {
    async fn send(&self, channel: &str, text: &str, identity: &Identity) -> Result<()> {
        match self {
            Self::Slack(n) => n.send(channel, text, identity).await,
            Self::Log(n) => n.send(channel, text, identity).await,
        }
    }
}
