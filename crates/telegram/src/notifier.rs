use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::warn;

use common::{Error, Notifier, Result};

/// Delivers alerts to every configured chat.
pub struct TelegramNotifier {
    bot: Bot,
    chat_ids: Vec<ChatId>,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_ids: &[i64]) -> Self {
        Self {
            bot,
            chat_ids: chat_ids.iter().copied().map(ChatId).collect(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    /// Succeeds when at least one chat received the message.
    async fn notify(&self, message: &str) -> Result<()> {
        let mut delivered = 0usize;
        let mut last_error = None;
        for &chat_id in &self.chat_ids {
            match self.bot.send_message(chat_id, message).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!(chat_id = chat_id.0, error = %e, "Failed to send Telegram alert");
                    last_error = Some(e.to_string());
                }
            }
        }
        match (delivered, last_error) {
            (0, Some(e)) => Err(Error::Http(format!("telegram: {e}"))),
            _ => Ok(()),
        }
    }
}
