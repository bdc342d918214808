//! Alerting module for webhook notifications
//!
//! Forwards notifications to Slack, Discord, and generic webhooks from an
//! async task. Producers push into an [`AlertQueue`], which is itself a
//! [`NotificationSink`], so pollers never wait on a webhook.

use crate::config::{AlertConfig, DiscordConfig, SlackConfig, WebhookConfig};
use crate::notify::{Notification, NotificationSink};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;

const QUEUE_CAPACITY: usize = 100;
const DEFAULT_USERNAME: &str = "HoneyGuard";

/// Errors that can occur during alert dispatch
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} returned status {status}")]
    Rejected { channel: String, status: u16 },

    #[error("Alert channel closed")]
    ChannelClosed,
}

/// Async alert dispatcher
pub struct AlertDispatcher {
    config: AlertConfig,
    client: Client,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig) -> Self {
        AlertDispatcher {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create a queue and the receiver `run` consumes
    pub fn channel() -> (AlertQueue, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (AlertQueue::new(tx), rx)
    }

    /// Whether a notification is forwarded at all under this configuration
    pub fn should_forward(&self, notification: &Notification) -> bool {
        if !self.config.enabled {
            return false;
        }
        match notification {
            Notification::Failure { .. } => self.config.include_failures,
            _ => true,
        }
    }

    /// Dispatch loop; returns once every queue handle is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<Notification>) {
        log::info!("Alert dispatcher started");

        while let Some(notification) = rx.recv().await {
            if !self.should_forward(&notification) {
                log::debug!("Not forwarding: {}", notification.summary());
                continue;
            }

            log::info!("Dispatching alert: {}", notification.summary());
            if let Err(e) = self.dispatch(&notification).await {
                log::error!("Failed to dispatch alert: {}", e);
            }
        }

        log::info!("Alert dispatcher stopped");
    }

    /// Send a notification to every configured channel. All channels are
    /// attempted; the first error is returned.
    pub async fn dispatch(&self, notification: &Notification) -> Result<(), AlertError> {
        let mut first_error = None;

        if let Some(ref slack) = self.config.slack {
            if let Err(e) = self.send_slack_alert(slack, notification).await {
                log::error!("Slack alert failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(ref discord) = self.config.discord {
            if let Err(e) = self.send_discord_alert(discord, notification).await {
                log::error!("Discord alert failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        for webhook in &self.config.webhooks {
            if let Err(e) = self.send_generic_webhook(webhook, notification).await {
                log::error!("Webhook {} failed: {}", webhook.name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_slack_alert(
        &self,
        config: &SlackConfig,
        notification: &Notification,
    ) -> Result<(), AlertError> {
        let payload = slack_payload(config, notification);
        let response = self.client.post(&config.webhook_url).json(&payload).send().await?;
        check_status("Slack", response.status())
    }

    async fn send_discord_alert(
        &self,
        config: &DiscordConfig,
        notification: &Notification,
    ) -> Result<(), AlertError> {
        let payload = discord_payload(config, notification);
        let response = self.client.post(&config.webhook_url).json(&payload).send().await?;
        check_status("Discord", response.status())
    }

    /// The notification itself, as JSON
    async fn send_generic_webhook(
        &self,
        config: &WebhookConfig,
        notification: &Notification,
    ) -> Result<(), AlertError> {
        let method = config.method.as_deref().unwrap_or("POST");

        let mut request = match method.to_uppercase().as_str() {
            "PUT" => self.client.put(&config.url),
            _ => self.client.post(&config.url),
        };

        if let Some(ref headers) = config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.json(notification).send().await?;
        check_status(&config.name, response.status())
    }
}

fn check_status(channel: &str, status: reqwest::StatusCode) -> Result<(), AlertError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(AlertError::Rejected {
            channel: channel.to_string(),
            status: status.as_u16(),
        })
    }
}

fn title(notification: &Notification) -> &'static str {
    match notification {
        Notification::TokenCreated { .. } => "Honeytoken created",
        Notification::Novelty { .. } => "Honeytoken accessed",
        Notification::Failure { .. } => "HoneyGuard error",
    }
}

/// Name/value pairs shown as attachment or embed fields
fn detail_fields(notification: &Notification) -> Vec<(&'static str, String)> {
    match notification {
        Notification::TokenCreated { token } => {
            let mut fields = vec![
                ("Token", token.token.clone()),
                ("Category", token.category.label().to_string()),
            ];
            if let Some(ref url) = token.image_url {
                fields.push(("Image URL", url.clone()));
            }
            fields
        }
        Notification::Novelty { alert } => {
            let mut fields = vec![
                ("Scope", alert.scope.to_string()),
                ("New entries", alert.count().to_string()),
            ];
            for entry in alert.headline() {
                fields.push((
                    "Access",
                    format!("{} from {} ({})", entry.timestamp.to_rfc3339(), entry.ip_address, entry.source),
                ));
            }
            fields
        }
        Notification::Failure { source, message } => {
            vec![("Source", source.to_string()), ("Error", message.clone())]
        }
    }
}

fn slack_payload(config: &SlackConfig, notification: &Notification) -> serde_json::Value {
    let (emoji, color) = match notification {
        Notification::TokenCreated { .. } => (":white_check_mark:", "good"),
        Notification::Novelty { .. } => (":rotating_light:", "danger"),
        Notification::Failure { .. } => (":warning:", "warning"),
    };

    let fields: Vec<serde_json::Value> = detail_fields(notification)
        .into_iter()
        .map(|(name, value)| serde_json::json!({ "title": name, "value": value, "short": (name != "Access") }))
        .collect();

    serde_json::json!({
        "channel": config.channel,
        "username": config.username.as_deref().unwrap_or(DEFAULT_USERNAME),
        "icon_emoji": ":honey_pot:",
        "attachments": [{
            "color": color,
            "title": format!("{} {}", emoji, title(notification)),
            "text": notification.summary(),
            "fields": fields,
        }]
    })
}

fn discord_payload(config: &DiscordConfig, notification: &Notification) -> serde_json::Value {
    let color = match notification {
        Notification::TokenCreated { .. } => 0x00CC66,
        Notification::Novelty { .. } => 0xFF0000,
        Notification::Failure { .. } => 0xFF6600,
    };

    let fields: Vec<serde_json::Value> = detail_fields(notification)
        .into_iter()
        .map(|(name, value)| serde_json::json!({ "name": name, "value": value, "inline": (name != "Access") }))
        .collect();

    serde_json::json!({
        "username": config.username.as_deref().unwrap_or(DEFAULT_USERNAME),
        "embeds": [{
            "title": title(notification),
            "description": notification.summary(),
            "color": color,
            "fields": fields,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "footer": { "text": "HoneyGuard honeytoken monitor" }
        }]
    })
}

/// Non-blocking producer side of the dispatcher
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<Notification>,
}

impl AlertQueue {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        AlertQueue { tx }
    }

    /// Queue without waiting. A full or closed queue drops the notification
    /// with a warning.
    pub fn queue_alert(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Alert queue full, dropping alert");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("Alert queue closed");
                }
            }
        }
    }

    pub async fn queue_alert_async(&self, notification: Notification) -> Result<(), AlertError> {
        self.tx
            .send(notification)
            .await
            .map_err(|_| AlertError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl NotificationSink for AlertQueue {
    fn notify(&self, notification: Notification) {
        self.queue_alert(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Token, TokenCategory};
    use crate::notify::FailureSource;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn created() -> Notification {
        Notification::TokenCreated {
            token: Token {
                token: "tok-123".to_string(),
                category: TokenCategory::Aws,
                image_url: None,
            },
        }
    }

    fn failure() -> Notification {
        Notification::failure(FailureSource::LogPolling, "connection refused")
    }

    fn enabled() -> AlertConfig {
        AlertConfig {
            enabled: true,
            ..AlertConfig::default()
        }
    }

    #[tokio::test]
    async fn test_alert_queue_send() {
        let (queue, mut rx) = AlertDispatcher::channel();
        assert!(!queue.is_closed());

        queue.notify(created());
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Notification::TokenCreated { .. }));

        queue.queue_alert_async(failure()).await.unwrap();
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_queue_drops_silently() {
        let (queue, rx) = AlertDispatcher::channel();
        drop(rx);
        assert!(queue.is_closed());
        queue.notify(created());
        assert!(matches!(
            queue.queue_alert_async(created()).await,
            Err(AlertError::ChannelClosed)
        ));
    }

    #[test]
    fn test_forwarding_rules() {
        let disabled = AlertDispatcher::new(AlertConfig::default());
        assert!(!disabled.should_forward(&created()));

        let dispatcher = AlertDispatcher::new(enabled());
        assert!(dispatcher.should_forward(&created()));
        assert!(!dispatcher.should_forward(&failure()));

        let with_failures = AlertDispatcher::new(AlertConfig {
            include_failures: true,
            ..enabled()
        });
        assert!(with_failures.should_forward(&failure()));
    }

    #[test]
    fn test_slack_payload() {
        let config = SlackConfig {
            webhook_url: "https://hooks.slack.invalid".to_string(),
            channel: Some("#security".to_string()),
            username: None,
        };
        let payload = slack_payload(&config, &created());
        assert_eq!(payload["channel"], "#security");
        assert_eq!(payload["username"], "HoneyGuard");
        assert_eq!(payload["attachments"][0]["color"], "good");
        assert_eq!(payload["attachments"][0]["fields"][0]["value"], "tok-123");
        assert_eq!(payload["attachments"][0]["fields"][1]["value"], "AWS Token");
    }

    #[test]
    fn test_discord_payload_for_failure() {
        let config = DiscordConfig {
            webhook_url: "https://discord.invalid".to_string(),
            username: Some("bot".to_string()),
        };
        let payload = discord_payload(&config, &failure());
        assert_eq!(payload["username"], "bot");
        assert_eq!(payload["embeds"][0]["title"], "HoneyGuard error");
        assert_eq!(payload["embeds"][0]["fields"][1]["value"], "connection refused");
    }

    #[tokio::test]
    async fn test_generic_webhook_receives_notification_json() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/hook"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = std::collections::HashMap::new();
        headers.insert("x-api-key".to_string(), "secret".to_string());
        let dispatcher = AlertDispatcher::new(AlertConfig {
            webhooks: vec![WebhookConfig {
                name: "siem".to_string(),
                url: format!("{}/hook", server.uri()),
                method: Some("put".to_string()),
                headers: Some(headers),
            }],
            ..enabled()
        });

        dispatcher.dispatch(&created()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["kind"], "token_created");
        assert_eq!(body["token"]["token"], "tok-123");
    }

    #[tokio::test]
    async fn test_rejected_webhook_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dispatcher = AlertDispatcher::new(AlertConfig {
            webhooks: vec![WebhookConfig {
                name: "siem".to_string(),
                url: server.uri(),
                method: None,
                headers: None,
            }],
            ..enabled()
        });

        match dispatcher.dispatch(&created()).await {
            Err(AlertError::Rejected { channel, status }) => {
                assert_eq!(channel, "siem");
                assert_eq!(status, 500);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_stops_when_queue_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = AlertDispatcher::new(AlertConfig {
            webhooks: vec![WebhookConfig {
                name: "siem".to_string(),
                url: server.uri(),
                method: None,
                headers: None,
            }],
            ..enabled()
        });
        let (queue, rx) = AlertDispatcher::channel();
        let task = tokio::spawn(dispatcher.run(rx));

        queue.notify(failure());
        queue.notify(created());
        drop(queue);
        task.await.unwrap();
    }
}
