use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{debug, error, info};

use crate::handlers::media::download_largest_photo;
use crate::handlers::responses::{reply_text, send_notice};
use crate::llm::GeneratedImage;
use crate::prompts::{draw_prompt, redraw_instruction};
use crate::state::AppState;
use crate::utils::telegram::uploading_photo;

pub const DRAW_STARTED_TEXT: &str = "Понял, начинаю рисовать...";
pub const REDRAW_STARTED_TEXT: &str = "Принял! Начинаю перерисовывать...";
pub const GENERATION_SUPPRESSED_TEXT: &str =
    "Не удалось сгенерировать изображение. Возможно, сработал фильтр безопасности.";
pub const GENERATION_FAILED_TEXT: &str =
    "Произошла серьезная внутренняя ошибка при отправке изображения.";

// Telegram rejects photo captions longer than 1024 characters.
const IMAGE_CAPTION_LIMIT: usize = 1000;

/// What the chat receives for one generation attempt.
#[derive(Debug, PartialEq)]
pub enum Delivery {
    Photo { bytes: Vec<u8>, caption: String },
    Text(&'static str),
}

pub fn plan_delivery(outcome: Result<GeneratedImage>, caption: &str) -> Delivery {
    match outcome {
        Ok(GeneratedImage::Image { bytes, mime_type }) => {
            debug!("Generated {} image of {} bytes", mime_type, bytes.len());
            Delivery::Photo {
                bytes,
                caption: caption.chars().take(IMAGE_CAPTION_LIMIT).collect(),
            }
        }
        Ok(GeneratedImage::Suppressed) => Delivery::Text(GENERATION_SUPPRESSED_TEXT),
        Err(err) => {
            error!("Image generation failed: {err:#}");
            Delivery::Text(GENERATION_FAILED_TEXT)
        }
    }
}

async fn deliver(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    outcome: Result<GeneratedImage>,
    caption: &str,
) -> Result<()> {
    let max_length = state.config.telegram_max_length;
    match plan_delivery(outcome, caption) {
        Delivery::Photo { bytes, caption } => {
            let sent = bot
                .send_photo(message.chat.id, InputFile::memory(bytes))
                .caption(caption)
                .await;
            if let Err(err) = sent {
                error!("Failed to send generated image: {err}");
                return reply_text(bot, message, GENERATION_FAILED_TEXT, None, None, max_length)
                    .await;
            }
            Ok(())
        }
        Delivery::Text(text) => reply_text(bot, message, text, None, None, max_length).await,
    }
}

pub async fn draw_handler(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    text: &str,
) -> Result<()> {
    send_notice(bot, message, DRAW_STARTED_TEXT).await?;
    info!("Drawing for chat {}", message.chat.id.0);

    let _uploading = uploading_photo(bot, message.chat.id);
    let outcome = state.gemini.generate_image(&draw_prompt(text), None).await;
    deliver(bot, state, message, outcome, text).await
}

pub async fn redraw_handler(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    caption: &str,
) -> Result<()> {
    send_notice(bot, message, REDRAW_STARTED_TEXT).await?;
    info!("Redrawing photo for chat {}", message.chat.id.0);

    let _uploading = uploading_photo(bot, message.chat.id);
    let outcome = match download_largest_photo(bot, &state.config.bot_token, message).await {
        Ok(image) => {
            state
                .gemini
                .generate_image(
                    &redraw_instruction(caption),
                    Some((image.mime_type.as_str(), image.bytes.as_slice())),
                )
                .await
        }
        Err(err) => Err(err),
    };
    deliver(
        bot,
        state,
        message,
        outcome,
        &format!("Перерисовано: {caption}"),
    )
    .await
}
