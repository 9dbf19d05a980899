use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::Serialize;

/// Sidebar color of a Discord embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedColor {
    Green,
    Orange,
    Red,
    Blue,
}

impl EmbedColor {
    fn rgb(self) -> u32 {
        match self {
            Self::Green => 0x2ecc71,
            Self::Orange => 0xe67e22,
            Self::Red => 0xe74c3c,
            Self::Blue => 0x3498db,
        }
    }
}

/// Client for posting embeds to a Discord webhook.
pub struct DiscordWebhook {
    client: Client,
    webhook_url: String,
}

#[derive(Serialize)]
struct WebhookRequest<'a> {
    username: &'a str,
    embeds: [Embed<'a>; 1],
}

#[derive(Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
}

impl DiscordWebhook {
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            webhook_url,
        })
    }

    /// Posts a single embed. Discord answers 204 on success.
    pub async fn push_message(&self, title: &str, text: &str, color: EmbedColor) -> Result<()> {
        let body = build_request(title, text, color);
        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn build_request<'a>(title: &'a str, text: &'a str, color: EmbedColor) -> WebhookRequest<'a> {
    WebhookRequest {
        username: "LP Monitor",
        embeds: [Embed {
            title,
            description: text,
            color: color.rgb(),
        }],
    }
}
