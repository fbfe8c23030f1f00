use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use crate::alert::engine::AlertEvent;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<()>;
}

/// Cross-team alert channel backed by the log.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        warn!(
            kind = event.kind.as_str(),
            at = %event.timestamp.to_rfc3339(),
            "[CROSS-TEAM ALERT] {} - {}",
            event.title,
            event.body
        );
        Ok(())
    }
}

pub struct StdoutSink;

#[async_trait]
impl AlertSink for StdoutSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        println!("{}", headline(event));
        Ok(())
    }
}

/// Posts to Slack or Discord incoming webhooks, or the raw event JSON to anything else.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("baseline-governor/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&webhook_payload(&self.url, event)?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn headline(event: &AlertEvent) -> String {
    format!("[{}] {} - {}", event.kind.as_str(), event.title, event.body)
}

fn webhook_payload(url: &str, event: &AlertEvent) -> Result<Value> {
    let text = format!("[{}] {}\n{}", event.kind.as_str(), event.title, event.body);
    if url.contains("hooks.slack.com") {
        Ok(json!({ "text": text }))
    } else if url.contains("discord.com/api/webhooks") || url.contains("discordapp.com/api/webhooks") {
        Ok(json!({ "content": text }))
    } else {
        Ok(serde_json::to_value(event)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertEventKind;

    fn event() -> AlertEvent {
        AlertEvent::new(
            AlertEventKind::MergeRejected,
            "Merge from team-backend rejected",
            "manual review required",
        )
    }

    #[test]
    fn chat_webhooks_get_a_text_message() {
        let slack = webhook_payload("https://hooks.slack.com/services/T/B/X", &event()).expect("slack");
        assert_eq!(
            slack["text"],
            "[merge_rejected] Merge from team-backend rejected\nmanual review required"
        );
        let discord = webhook_payload("https://discord.com/api/webhooks/1/abc", &event()).expect("discord");
        assert!(discord["content"].as_str().is_some());
    }

    #[test]
    fn other_webhooks_get_the_event() {
        let raw = webhook_payload("https://alerts.internal/hook", &event()).expect("raw");
        assert_eq!(raw["kind"], "merge_rejected");
        assert_eq!(raw["title"], "Merge from team-backend rejected");
    }
}
