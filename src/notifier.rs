use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Recipient};
use tracing::{debug, warn};

/// Telegram rejects message texts longer than 4096 chars.
const MAX_MESSAGE_LEN: usize = 4096;
const ELLIPSIS: &str = "…";

/// Destination for report messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Sends reports to a single Telegram chat or channel.
pub struct TelegramNotifier {
    bot: Bot,
    recipient: Recipient,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Self {
        Self {
            bot: Bot::new(token),
            recipient: recipient(chat_id),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let text = truncate_report(text, MAX_MESSAGE_LEN);
        self.bot
            .send_message(self.recipient.clone(), text.as_str())
            .await
            .with_context(|| format!("Failed to send message to {:?}", self.recipient))?;
        debug!("Bot sent message \"{}\"", text);
        Ok(())
    }
}

/// Numeric ids address chats directly; anything else is a channel username.
fn recipient(chat_id: &str) -> Recipient {
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.to_string()),
    }
}

/// A report is one message; oversized ones (usually fault descriptions
/// carrying a response body) are cut on a char boundary and marked.
fn truncate_report(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }

    let mut end = max_len.saturating_sub(ELLIPSIS.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    warn!("Report of {} bytes truncated to fit one message", text.len());
    format!("{}{}", &text[..end], ELLIPSIS)
}
