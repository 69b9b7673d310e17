use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use teloxide::types::Message;
use tracing::info;

const TIMER_TEXT_PREVIEW: usize = 120;

/// Times one routed update from receipt until the handler returns.
#[derive(Debug)]
pub struct HandlerTimer {
    handler: &'static str,
    chat_id: i64,
    message_id: i32,
    text: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    completed: bool,
}

impl HandlerTimer {
    pub fn from_message(handler: &'static str, message: &Message) -> Self {
        let text = message
            .text()
            .or_else(|| message.caption())
            .map(|value| value.replace('\n', " ").chars().take(TIMER_TEXT_PREVIEW).collect());

        HandlerTimer {
            handler,
            chat_id: message.chat.id.0,
            message_id: message.id.0,
            text,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            completed: false,
        }
    }

    fn log_received(&self) {
        info!(
            target: "bot.timing",
            "event=update_received handler={} chat_id={} message_id={} received_at={} text={:?}",
            self.handler,
            self.chat_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            self.text
        );
    }

    pub fn complete(&mut self, status: &str, detail: Option<String>) {
        if self.completed {
            return;
        }
        self.completed = true;
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "bot.timing",
            "event=update_completed handler={} chat_id={} message_id={} completed_at={} duration_s={:.3} status={} detail={}",
            self.handler,
            self.chat_id,
            self.message_id,
            Utc::now().to_rfc3339(),
            duration,
            status,
            detail.unwrap_or_default()
        );
    }
}

pub fn start_handler_timer(handler: &'static str, message: &Message) -> HandlerTimer {
    let timer = HandlerTimer::from_message(handler, message);
    timer.log_received();
    timer
}

pub async fn log_llm_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "bot.timing",
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        Utc::now().to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    info!(
        target: "bot.timing",
        "event=llm_response provider={} model={} operation={} duration_s={:.3} status={}",
        provider,
        model,
        operation,
        started_perf.elapsed().as_secs_f64(),
        status
    );

    result
}
