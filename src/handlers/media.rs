use anyhow::{anyhow, Result};
use teloxide::prelude::*;
use teloxide::types::FileId;

use crate::llm::media::{decode_image, download_media, DecodedImage};

pub async fn get_file_url(bot: &Bot, bot_token: &str, file_id: &FileId) -> Result<String> {
    let file = bot.get_file(file_id.clone()).await?;
    let api_url = bot.api_url();
    Ok(format!(
        "{}/file/bot{}/{}",
        api_url.as_str().trim_end_matches('/'),
        bot_token,
        file.path
    ))
}

/// Downloads and decodes the highest resolution size of the message's photo.
pub async fn download_largest_photo(
    bot: &Bot,
    bot_token: &str,
    message: &Message,
) -> Result<DecodedImage> {
    let photo = message
        .photo()
        .and_then(|sizes| sizes.last())
        .ok_or_else(|| anyhow!("message {} carries no photo", message.id.0))?;
    let url = get_file_url(bot, bot_token, &photo.file.id).await?;
    let bytes = download_media(&url).await?;
    decode_image(bytes)
}
