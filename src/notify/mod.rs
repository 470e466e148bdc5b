//! Best-effort Telegram notifications.
//!
//! Delivery never blocks or fails the engine: a missing token or an HTTP
//! error is logged and swallowed.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Fire-and-forget text delivery to a Telegram chat.
pub struct Notifier {
    client: reqwest::Client,
    bot_token: Option<String>,
}

impl Notifier {
    /// Build a notifier from the `TELEGRAM_BOT_TOKEN` environment
    /// variable. Without a token the notifier is a no-op.
    pub fn from_env() -> Self {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        if bot_token.is_none() {
            debug!("TELEGRAM_BOT_TOKEN not set; notifications disabled");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self { client, bot_token }
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }

    /// Send a message to a chat. Errors are logged, never returned.
    pub async fn send(&self, chat_id: &str, text: &str) {
        let Some(token) = &self.bot_token else {
            debug!(chat_id = %chat_id, "Notification skipped (no bot token)");
            return;
        };

        let url = format!("{TELEGRAM_API}/bot{token}/sendMessage");
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(chat_id = %chat_id, "Notification sent");
            }
            Ok(response) => {
                warn!(chat_id = %chat_id, status = %response.status(), "Telegram rejected message");
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "Failed to send notification");
            }
        }
    }
}
