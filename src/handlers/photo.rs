use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{error, info};

use crate::handlers::media::download_largest_photo;
use crate::handlers::responses::reply_text;
use crate::llm::media::DecodedImage;
use crate::llm::{ChatSession, GeminiClient, Part};
use crate::prompts::{PhotoTask, ANALYZE_IMAGE_PROMPT};
use crate::state::AppState;
use crate::utils::telegram::typing;

pub const PHOTO_REQUIRED_TEXT: &str = "Пожалуйста, отправь фото.";
pub const PHOTO_TASK_FAILED_TEXT: &str =
    "Не удалось обработать изображение. Возможно, ответ был заблокирован фильтром безопасности.";

/// Collapses the model's prompt output onto one line without Markdown
/// emphasis, so it fits inside an inline code span.
pub fn clean_prompt_text(raw: &str) -> String {
    raw.replace('\n', ", ").replace('*', "").trim().to_string()
}

#[allow(deprecated)]
pub fn format_task_reply(task: PhotoTask, raw: &str) -> (String, Option<ParseMode>) {
    match task {
        PhotoTask::Prompt => (
            format!("Готовый промпт:\n\n`{}`", clean_prompt_text(raw)),
            Some(ParseMode::Markdown),
        ),
        PhotoTask::Analysis => (raw.to_string(), Some(ParseMode::Markdown)),
        PhotoTask::Translation => (raw.to_string(), None),
    }
}

/// Two turns on a throwaway session: the model first describes the photo,
/// then answers the task instruction with that description in context.
pub async fn run_photo_task(
    gemini: &GeminiClient,
    image: &DecodedImage,
    task: PhotoTask,
) -> Result<String> {
    let mut session = ChatSession::new();
    session
        .send_message(
            gemini,
            vec![
                Part::text(ANALYZE_IMAGE_PROMPT),
                Part::image(&image.mime_type, &image.bytes),
            ],
        )
        .await?;
    session
        .send_message(gemini, vec![Part::text(task.instruction())])
        .await
}

async fn process_photo(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    task: PhotoTask,
) -> Result<String> {
    let image = download_largest_photo(bot, &state.config.bot_token, message).await?;
    info!(
        "Running {} task on {}x{} photo for chat {}",
        task.name(),
        image.width,
        image.height,
        message.chat.id.0
    );
    run_photo_task(&state.gemini, &image, task).await
}

pub async fn photo_task_handler(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    task: PhotoTask,
) -> Result<()> {
    let max_length = state.config.telegram_max_length;
    if message.photo().is_none() {
        return reply_text(bot, message, PHOTO_REQUIRED_TEXT, None, None, max_length).await;
    }

    let _typing = typing(bot, message.chat.id);
    match process_photo(bot, state, message, task).await {
        Ok(raw) => {
            let (text, parse_mode) = format_task_reply(task, &raw);
            if let Err(err) = reply_text(bot, message, &text, parse_mode, None, max_length).await
            {
                error!("Failed to deliver {} result: {err:#}", task.name());
                return reply_text(bot, message, PHOTO_TASK_FAILED_TEXT, None, None, max_length)
                    .await;
            }
            Ok(())
        }
        Err(err) => {
            error!("Photo task {} failed: {err:#}", task.name());
            reply_text(bot, message, PHOTO_TASK_FAILED_TEXT, None, None, max_length).await
        }
    }
}
