use anyhow::Result;
use teloxide::prelude::*;
use tracing::{debug, error, info};

use crate::handlers::responses::reply_text;
use crate::state::AppState;
use crate::utils::telegram::typing;

pub const DIALOGUE_FAILED_TEXT: &str =
    "Произошла ошибка. Попробуйте очистить память командой /reset.";

/// One turn of the chat's running conversation. The dialogue lock is held
/// until the reply is delivered, so turns from the same chat queue up.
pub async fn dialogue_handler(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    text: &str,
) -> Result<()> {
    let chat_id = message.chat.id;
    let max_length = state.config.telegram_max_length;
    let _typing = typing(bot, chat_id);

    let chat = state.sessions.get_or_create(chat_id.0);
    let mut session = chat.lock().await;
    if session.is_empty() {
        info!("Starting a new dialogue for chat {}", chat_id.0);
    }

    let reply = match session.send_message_streamed(&state.gemini, text).await {
        Ok(reply) => reply,
        Err(err) => {
            error!("Dialogue turn failed for chat {}: {err:#}", chat_id.0);
            return reply_text(bot, message, DIALOGUE_FAILED_TEXT, None, None, max_length).await;
        }
    };
    debug!("Dialogue for chat {} holds {} turns", chat_id.0, session.len());

    if let Err(err) = reply_text(bot, message, &reply, None, None, max_length).await {
        // History only keeps answers the chat actually received.
        error!("Failed to deliver dialogue reply for chat {}: {err:#}", chat_id.0);
        session.forget_last_exchange();
        return reply_text(bot, message, DIALOGUE_FAILED_TEXT, None, None, max_length).await;
    }
    Ok(())
}
