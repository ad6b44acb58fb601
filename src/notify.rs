use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::extract::CandidateRecord;

const MENTION: &str = "@everyone";
const FOOTER: &str = "Vuja De Monitor";
const EMBED_COLOUR: u32 = 0;
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub url: String,
    pub site_name: String,
}

impl NotificationPayload {
    pub fn new(record: &CandidateRecord, site_name: &str) -> Self {
        Self {
            title: record.title.clone(),
            url: record.url.clone(),
            site_name: site_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No webhook configured, nothing was attempted.
    Disabled,
    Failed(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &NotificationPayload) -> Delivery;
}

#[derive(Serialize)]
struct WebhookMessage {
    content: &'static str,
    embeds: Vec<Embed>,
}

#[derive(Serialize)]
struct Embed {
    title: String,
    description: String,
    url: String,
    color: u32,
    footer: Footer,
}

#[derive(Serialize)]
struct Footer {
    text: &'static str,
}

impl From<&NotificationPayload> for WebhookMessage {
    fn from(payload: &NotificationPayload) -> Self {
        Self {
            content: MENTION,
            embeds: vec![Embed {
                title: format!("🚨 New Stock at {}!", payload.site_name),
                description: format!("**{}**", payload.title),
                url: payload.url.clone(),
                color: EMBED_COLOUR,
                footer: Footer { text: FOOTER },
            }],
        }
    }
}

/// Posts one embed per new product to a Discord webhook, pausing after each post.
pub struct DiscordWebhook {
    client: Client,
    webhook_url: Option<String>,
    delay: Duration,
}

impl DiscordWebhook {
    pub fn new(client: Client, webhook_url: Option<String>, delay: Duration) -> Self {
        if webhook_url.is_none() {
            warn!("No DISCORD_WEBHOOK_URL configured, new products will only be logged");
        }
        Self {
            client,
            webhook_url,
            delay,
        }
    }

    async fn post(&self, url: &str, payload: &NotificationPayload) -> Result<(), reqwest::Error> {
        self.client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&WebhookMessage::from(payload))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn notify(&self, payload: &NotificationPayload) -> Delivery {
        let Some(url) = &self.webhook_url else {
            warn!(
                "Webhook disabled, not sending {} ({})",
                payload.title, payload.url
            );
            return Delivery::Disabled;
        };

        let delivery = match self.post(url, payload).await {
            Ok(()) => {
                info!("Sent alert for {} at {}", payload.title, payload.site_name);
                Delivery::Sent
            }
            Err(e) => {
                error!("Error sending alert for {}: {}", payload.url, e);
                Delivery::Failed(e.to_string())
            }
        };
        sleep(self.delay).await;
        delivery
    }
}
