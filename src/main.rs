use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

mod config;
mod handlers;
mod llm;
mod prompts;
mod session;
mod state;
#[cfg(test)]
mod test_support;
mod utils;
mod web;

use config::{log_level_from_env, Config};
use handlers::intent::{classify, Intent};
use handlers::{dialogue, generate, menu, photo};
use session::PendingAction;
use state::AppState;
use utils::logging::init_logging;
use utils::timing::start_handler_timer;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
    Reset,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let guards = init_logging(&log_level_from_env());

    let config = match Config::load() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            error!("CRITICAL: configuration error, refusing to start: {err:#}");
            drop(guards);
            std::process::exit(1);
        }
    };

    let state = AppState::new(config.clone());
    let bot = Bot::new(config.bot_token.clone());
    info!(
        "Starting Gemini vision bot (vision model: {}, image model: {})",
        config.vision_model, config.image_model
    );

    let port = config.port;
    tokio::spawn(async move {
        if let Err(err) = web::liveness::serve(port).await {
            error!("Liveness server failed: {err:#}");
        }
    });
    tokio::spawn(web::keepalive::run(
        config.public_base_url(),
        config.keep_alive_interval,
    ));

    // A pending follow-up claims the next message before anything else,
    // commands and menu buttons included.
    let pending_handler = dptree::filter_map(|state: AppState, message: Message| {
        state.sessions.take_pending(message.chat.id.0)
    })
    .endpoint(handle_pending);

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let handler = Update::filter_message()
        .branch(pending_handler)
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| msg.photo().is_some() || msg.text().is_some())
                .endpoint(handle_message),
        )
        .endpoint(ignore_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn finish(
    timer: &mut utils::timing::HandlerTimer,
    handler: &str,
    result: anyhow::Result<()>,
) -> HandlerResult {
    match result {
        Ok(()) => timer.complete("success", None),
        Err(err) => {
            error!("{handler} handler failed: {err:#}");
            timer.complete("error", Some(err.to_string()));
        }
    }
    Ok(())
}

async fn handle_pending(
    bot: Bot,
    state: AppState,
    message: Message,
    pending: PendingAction,
) -> HandlerResult {
    match pending {
        PendingAction::AwaitPhoto(task) => {
            let mut timer = start_handler_timer("photo_task", &message);
            let result = photo::photo_task_handler(&bot, &state, &message, task).await;
            finish(&mut timer, "photo_task", result)
        }
    }
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    match command {
        Command::Start => {
            let mut timer = start_handler_timer("start", &message);
            let result = menu::start_handler(&bot, &state, &message).await;
            finish(&mut timer, "start", result)
        }
        Command::Reset => {
            let mut timer = start_handler_timer("reset", &message);
            let result = menu::clear_memory_handler(&bot, &state, &message).await;
            finish(&mut timer, "reset", result)
        }
    }
}

async fn handle_message(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    let has_photo = message.photo().is_some();
    let text = message
        .text()
        .or_else(|| message.caption())
        .unwrap_or_default()
        .trim()
        .to_string();
    let intent = classify(&text, has_photo);

    let mut timer = start_handler_timer(intent.label(), &message);
    let result = match intent {
        Intent::Menu(action) => menu::handle_menu_action(&bot, &state, &message, action).await,
        Intent::Draw => generate::draw_handler(&bot, &state, &message, &text).await,
        Intent::Redraw => generate::redraw_handler(&bot, &state, &message, &text).await,
        Intent::Dialogue => dialogue::dialogue_handler(&bot, &state, &message, &text).await,
        Intent::PhotoWithoutTask => menu::photo_hint_handler(&bot, &state, &message).await,
    };
    finish(&mut timer, intent.label(), result)
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
