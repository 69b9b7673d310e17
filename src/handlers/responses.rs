use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{KeyboardMarkup, ParseMode, ReplyParameters};
use teloxide::RequestError;
use tracing::warn;

const TRUNCATION_NOTICE: &str = "\n\n(ответ сокращён)";

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_reply(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_NOTICE.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_NOTICE);
    truncated
}

async fn send_reply(
    bot: &Bot,
    message: &Message,
    text: &str,
    parse_mode: Option<ParseMode>,
    keyboard: Option<&KeyboardMarkup>,
) -> Result<Message, RequestError> {
    let mut request = bot
        .send_message(message.chat.id, text.to_string())
        .reply_parameters(ReplyParameters::new(message.id));
    if let Some(mode) = parse_mode {
        request = request.parse_mode(mode);
    }
    if let Some(keyboard) = keyboard {
        request = request.reply_markup(keyboard.clone());
    }
    request.await
}

/// Replies to `message`. Model output is not guaranteed to be valid
/// Telegram Markdown, so a rejected formatted reply is resent as plain text.
pub async fn reply_text(
    bot: &Bot,
    message: &Message,
    text: &str,
    parse_mode: Option<ParseMode>,
    keyboard: Option<&KeyboardMarkup>,
    max_chars: usize,
) -> Result<()> {
    let text = truncate_reply(text, max_chars);
    match send_reply(bot, message, &text, parse_mode, keyboard).await {
        Ok(_) => Ok(()),
        Err(RequestError::Api(err)) if parse_mode.is_some() => {
            warn!("Failed to send formatted reply, resending as plain text: {err}");
            send_reply(bot, message, &text, None, keyboard).await?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Plain message to the chat, not threaded as a reply.
pub async fn send_notice(bot: &Bot, message: &Message, text: &str) -> Result<()> {
    bot.send_message(message.chat.id, text.to_string()).await?;
    Ok(())
}
