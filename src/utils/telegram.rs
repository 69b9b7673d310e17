use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tokio::task::JoinHandle;
use tracing::debug;

// Telegram clears a chat action after roughly five seconds.
const CHAT_ACTION_REFRESH_INTERVAL: Duration = Duration::from_secs(4);

/// Keeps a "typing" / "sending photo" indicator visible until dropped.
pub struct ChatActionHeartbeat {
    task_handle: Option<JoinHandle<()>>,
}

impl Drop for ChatActionHeartbeat {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

pub fn start_chat_action_heartbeat(
    bot: Bot,
    chat_id: ChatId,
    action: ChatAction,
) -> ChatActionHeartbeat {
    let task_handle = tokio::spawn(async move {
        loop {
            if let Err(err) = bot.send_chat_action(chat_id, action.clone()).await {
                debug!("send_chat_action failed for chat {}: {err}", chat_id.0);
            }
            tokio::time::sleep(CHAT_ACTION_REFRESH_INTERVAL).await;
        }
    });

    ChatActionHeartbeat {
        task_handle: Some(task_handle),
    }
}

pub fn typing(bot: &Bot, chat_id: ChatId) -> ChatActionHeartbeat {
    start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::Typing)
}

pub fn uploading_photo(bot: &Bot, chat_id: ChatId) -> ChatActionHeartbeat {
    start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::UploadPhoto)
}
