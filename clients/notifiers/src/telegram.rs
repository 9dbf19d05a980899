use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::Serialize;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Client for sending messages via Telegram Bot API.
pub struct TelegramBot {
    client: Client,
    api_key: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: String,
    disable_web_page_preview: bool,
}

impl TelegramBot {
    /// Creates a new `TelegramBot` with the given API key and chat ID.
    pub fn new(api_key: String, chat_id: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            chat_id,
        })
    }

    /// Sends a titled message to the configured chat.
    pub async fn push_message(&self, title: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.api_key);
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text: format_message(title, text),
            disable_web_page_preview: true,
        };
        self.client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn format_message(title: &str, text: &str) -> String {
    if title.is_empty() {
        text.to_string()
    } else {
        format!("{title}\n\n{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "body", "body")]
    #[case("Out of range", "body", "Out of range\n\nbody")]
    fn test_format_message(#[case] title: &str, #[case] text: &str, #[case] expected: &str) {
        assert_eq!(format_message(title, text), expected);
    }

    #[rstest]
    fn test_request_serializes_chat_id() {
        let body = SendMessageRequest {
            chat_id: "42",
            text: "hi".to_string(),
            disable_web_page_preview: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["chat_id"], "42");
        assert_eq!(json["text"], "hi");
    }
}
