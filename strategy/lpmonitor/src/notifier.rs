//! Notification fan-out.
//!
//! Channels are composed once from configuration. Every notification goes to every
//! channel; a failing channel never blocks the others and never fails the poll.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use clients_notifiers::{DiscordWebhook, EmbedColor, Pushover, PushoverPriority, TelegramBot};
use futures::future::join_all;

use crate::config::ChannelConfig;
use crate::error::MonitorError;
use crate::events::{EventKind, Notification, Severity};

/// A destination for notifications.
pub trait NotificationChannel: Send + Sync {
    /// Short name used in logs and delivery reports.
    fn id(&self) -> &str;

    fn send(&self, notification: &Notification) -> impl Future<Output = Result<()>> + Send;
}

pub enum Channel {
    Telegram(TelegramBot),
    Discord(DiscordWebhook),
    Pushover(Pushover),
}

impl Channel {
    pub fn from_config(config: &ChannelConfig, timeout: Duration) -> Result<Self, MonitorError> {
        let channel = match config {
            ChannelConfig::Telegram { bot_token, chat_id } => {
                TelegramBot::new(bot_token.clone(), chat_id.clone(), timeout).map(Self::Telegram)
            }
            ChannelConfig::Discord { webhook_url } => {
                DiscordWebhook::new(webhook_url.clone(), timeout).map(Self::Discord)
            }
            ChannelConfig::Pushover {
                api_token,
                user_key,
            } => Pushover::new(api_token.clone(), user_key.clone(), timeout).map(Self::Pushover),
        };
        channel.map_err(|e| MonitorError::Configuration(format!("notification channel: {e:#}")))
    }
}

fn embed_color(notification: &Notification) -> EmbedColor {
    let Notification::Position(event) = notification else {
        return EmbedColor::Blue;
    };
    match (event.severity(), &event.kind) {
        (Severity::Critical, _) => EmbedColor::Red,
        (Severity::Warning, _) => EmbedColor::Orange,
        (Severity::Info, EventKind::EnteredRange) => EmbedColor::Green,
        (Severity::Info, _) => EmbedColor::Blue,
    }
}

fn pushover_priority(severity: Severity) -> PushoverPriority {
    match severity {
        Severity::Critical => PushoverPriority::High,
        Severity::Warning => PushoverPriority::Normal,
        Severity::Info => PushoverPriority::Low,
    }
}

impl NotificationChannel for Channel {
    fn id(&self) -> &str {
        match self {
            Self::Telegram(_) => "telegram",
            Self::Discord(_) => "discord",
            Self::Pushover(_) => "pushover",
        }
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let title = notification.title();
        let body = notification.body();
        match self {
            Self::Telegram(bot) => bot.push_message(&title, &body).await,
            Self::Discord(webhook) => {
                webhook
                    .push_message(&title, &body, embed_color(notification))
                    .await
            }
            Self::Pushover(client) => {
                client
                    .push_message(&title, &body, pushover_priority(notification.severity()))
                    .await
            }
        }
    }
}

/// Outcome of one notification on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub channel: String,
    pub delivered: bool,
    pub error: Option<String>,
}

pub struct NotificationDispatcher<C> {
    channels: Vec<C>,
    timeout: Duration,
}

impl<C: NotificationChannel> NotificationDispatcher<C> {
    pub fn new(channels: Vec<C>, timeout: Duration) -> Self {
        Self { channels, timeout }
    }

    pub fn channels(&self) -> &[C] {
        &self.channels
    }

    /// Sends `notification` to every channel concurrently.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DeliveryReport> {
        let subject = &notification.subject();
        if self.channels.is_empty() {
            tracing::info!(%subject, title = %notification.title(), "no channel configured");
            return Vec::new();
        }

        let sends = self.channels.iter().map(|channel| async move {
            let outcome = tokio::time::timeout(self.timeout, channel.send(notification)).await;
            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{err:#}")),
                Err(_) => Some(format!("timed out after {} ms", self.timeout.as_millis())),
            };
            match &error {
                None => {
                    tracing::debug!(channel = channel.id(), %subject, "notification delivered")
                }
                Some(reason) => tracing::warn!(
                    channel = channel.id(),
                    %subject,
                    error = %reason,
                    "notification failed"
                ),
            }
            DeliveryReport {
                channel: channel.id().to_string(),
                delivered: error.is_none(),
                error,
            }
        });
        join_all(sends).await
    }
}
