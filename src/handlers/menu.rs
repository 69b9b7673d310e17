use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup, ParseMode};
use tracing::info;

use crate::handlers::responses::reply_text;
use crate::prompts::PhotoTask;
use crate::session::PendingAction;
use crate::state::AppState;

pub const START_TEXT: &str =
    "Привет! Я многофункциональный AI-бот. Используйте меню для навигации.";
pub const MEMORY_CLEARED_TEXT: &str = "Память диалога очищена.";
pub const PHOTO_HINT_TEXT: &str =
    "Я вижу фото. Что мне с ним сделать? Используйте кнопки меню, чтобы выбрать действие.";

pub const HELP_TEXT: &str = "*Инструкция по работе с ботом:*\n\n\
1. *Выбери действие:* Нажми одну из кнопок в меню.\n\
2. *Следуй инструкции:* Бот попросит отправить фото или текст.\n\
3. *Получи результат!*\n\n\
*Описание функций:*\n\
🖼️ *Создать промпт* — Отправь фото, чтобы получить короткий список тегов на английском для генерации похожих изображений.\n\n\
🔎 *Детальный анализ* — Отправь любое фото для получения подробного структурированного отчета о том, что на нем изображено.\n\n\
🔤 *Перевести текст* — Отправь фото с текстом на любом языке, чтобы получить его перевод на русский.\n\n\
🗑️ *Очистить память* — Сбрасывает историю диалога со мной.\n\n\
📊 *Статус* — Показывает техническую информацию о боте.\n\n\
✍️ *Диалог и рисование* — Просто напиши мне сообщение для общения или используй команду 'Нарисуй...', чтобы я создал изображение.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    CreatePrompt,
    DetailedAnalysis,
    TranslateText,
    ClearMemory,
    Status,
    Help,
}

impl MenuAction {
    pub const ALL: [MenuAction; 6] = [
        MenuAction::CreatePrompt,
        MenuAction::DetailedAnalysis,
        MenuAction::TranslateText,
        MenuAction::ClearMemory,
        MenuAction::Status,
        MenuAction::Help,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MenuAction::CreatePrompt => "🖼️ Создать промпт",
            MenuAction::DetailedAnalysis => "🔎 Детальный анализ",
            MenuAction::TranslateText => "🔤 Перевести текст с фото",
            MenuAction::ClearMemory => "🗑️ Очистить память",
            MenuAction::Status => "📊 Статус",
            MenuAction::Help => "ℹ️ Помощь",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::ALL.into_iter().find(|action| action.label() == text)
    }
}

fn button_row(actions: &[MenuAction]) -> Vec<KeyboardButton> {
    actions
        .iter()
        .map(|action| KeyboardButton::new(action.label()))
        .collect()
}

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        button_row(&[MenuAction::CreatePrompt, MenuAction::DetailedAnalysis]),
        button_row(&[MenuAction::TranslateText]),
        button_row(&[MenuAction::ClearMemory, MenuAction::Status, MenuAction::Help]),
    ])
    .resize_keyboard()
}

pub fn build_status_text(
    memory_active: bool,
    active_dialogues: usize,
    vision_model: &str,
    image_model: &str,
) -> String {
    let memory = if memory_active {
        "✅ Активна"
    } else {
        "💤 Очищена"
    };
    format!(
        "*📊 Статус системы:*\n\n\
         • *Память вашего чата:* {memory}\n\
         • *Активных диалогов:* {active_dialogues}\n\n\
         *🧠 Используемые модели:*\n\
         • *Диалог/Анализ:* `{vision_model}`\n\
         • *Генерация:* `{image_model}`"
    )
}

async fn reply_with_menu(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    text: &str,
    parse_mode: Option<ParseMode>,
) -> Result<()> {
    let menu = main_menu();
    reply_text(
        bot,
        message,
        text,
        parse_mode,
        Some(&menu),
        state.config.telegram_max_length,
    )
    .await
}

pub async fn start_handler(bot: &Bot, state: &AppState, message: &Message) -> Result<()> {
    reply_with_menu(bot, state, message, START_TEXT, None).await
}

pub async fn clear_memory_handler(bot: &Bot, state: &AppState, message: &Message) -> Result<()> {
    if state.sessions.clear(message.chat.id.0) {
        info!("Cleared dialogue for chat {}", message.chat.id.0);
    }
    reply_with_menu(bot, state, message, MEMORY_CLEARED_TEXT, None).await
}

pub async fn photo_hint_handler(bot: &Bot, state: &AppState, message: &Message) -> Result<()> {
    reply_with_menu(bot, state, message, PHOTO_HINT_TEXT, None).await
}

async fn request_photo(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    task: PhotoTask,
) -> Result<()> {
    state
        .sessions
        .arm_pending(message.chat.id.0, PendingAction::AwaitPhoto(task));
    reply_text(
        bot,
        message,
        task.request_text(),
        None,
        None,
        state.config.telegram_max_length,
    )
    .await
}

#[allow(deprecated)]
pub async fn handle_menu_action(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    action: MenuAction,
) -> Result<()> {
    match action {
        MenuAction::CreatePrompt => request_photo(bot, state, message, PhotoTask::Prompt).await,
        MenuAction::DetailedAnalysis => {
            request_photo(bot, state, message, PhotoTask::Analysis).await
        }
        MenuAction::TranslateText => {
            request_photo(bot, state, message, PhotoTask::Translation).await
        }
        MenuAction::ClearMemory => clear_memory_handler(bot, state, message).await,
        MenuAction::Help => {
            reply_with_menu(bot, state, message, HELP_TEXT, Some(ParseMode::Markdown)).await
        }
        MenuAction::Status => {
            let status = build_status_text(
                state.sessions.contains(message.chat.id.0),
                state.sessions.active_dialogues(),
                state.gemini.vision_model(),
                state.gemini.image_model(),
            );
            reply_with_menu(bot, state, message, &status, Some(ParseMode::Markdown)).await
        }
    }
}
