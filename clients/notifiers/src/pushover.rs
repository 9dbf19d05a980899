use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::Serialize;

const PUSHOVER_MESSAGES_URL: &str = "https://api.pushover.net/1/messages.json";

/// Pushover message priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushoverPriority {
    Low,
    Normal,
    High,
}

impl PushoverPriority {
    fn value(self) -> i8 {
        match self {
            Self::Low => -1,
            Self::Normal => 0,
            Self::High => 1,
        }
    }
}

/// Client for the Pushover messages API.
pub struct Pushover {
    client: Client,
    api_token: String,
    user_key: String,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    token: &'a str,
    user: &'a str,
    title: &'a str,
    message: &'a str,
    priority: i8,
}

impl Pushover {
    pub fn new(api_token: String, user_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_token,
            user_key,
        })
    }

    pub async fn push_message(
        &self,
        title: &str,
        text: &str,
        priority: PushoverPriority,
    ) -> Result<()> {
        let body = MessageRequest {
            token: &self.api_token,
            user: &self.user_key,
            title,
            message: text,
            priority: priority.value(),
        };
        self.client
            .post(PUSHOVER_MESSAGES_URL)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PushoverPriority::Low, -1)]
    #[case(PushoverPriority::Normal, 0)]
    #[case(PushoverPriority::High, 1)]
    fn test_priority_values(#[case] priority: PushoverPriority, #[case] expected: i8) {
        assert_eq!(priority.value(), expected);
    }
}
