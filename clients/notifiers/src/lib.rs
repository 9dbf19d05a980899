//! Outbound message clients: Telegram bots, Discord webhooks and Pushover.

mod discord;
mod pushover;
mod telegram;

pub use discord::{DiscordWebhook, EmbedColor};
pub use pushover::{Pushover, PushoverPriority};
pub use telegram::TelegramBot;
