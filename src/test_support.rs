//! Loopback stand-ins for the Telegram Bot API and Gemini, shared by the
//! handler and client tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use image::{DynamicImage, ImageFormat, RgbImage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use teloxide::prelude::*;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::state::AppState;

pub const TEST_CHAT_ID: i64 = 4242;
pub const TEST_BOT_TOKEN: &str = "123:test-token";
pub const TEST_API_KEY: &str = "secret-key";

async fn spawn_router(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn tiny_png() -> Vec<u8> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(3, 2))
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

pub fn text_response(text: &str) -> String {
    json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
        .to_string()
}

/// Answers `models/{model}:{method}` with a canned body per method and
/// records every request payload. Methods without a body fail with 500.
#[derive(Clone, Default)]
pub struct FakeGemini {
    pub replies: Arc<Mutex<HashMap<String, String>>>,
    pub requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeGemini {
    pub fn reply(&self, method: &str, body: String) {
        self.replies.lock().insert(method.to_string(), body);
    }

    pub async fn spawn(&self) -> SocketAddr {
        let app = Router::new()
            .route("/models/{model_method}", post(gemini_endpoint))
            .with_state(self.clone());
        spawn_router(app).await
    }
}

async fn gemini_endpoint(
    State(fake): State<FakeGemini>,
    Path(model_method): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    fake.requests.lock().push(body);
    let method = model_method.rsplit(':').next().unwrap_or_default().to_string();
    let reply = fake.replies.lock().get(&method).cloned();
    match reply {
        Some(body) if method == "streamGenerateContent" => {
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        Some(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":{"message":"boom"}}"#,
        )
            .into_response(),
    }
}

/// One Bot API call as seen by the fake server.
#[derive(Debug, Clone)]
pub struct TelegramCall {
    pub method: String,
    pub body: Value,
}

/// Minimal Bot API: records calls, can reject the next `sendMessage`
/// calls, and serves a single photo through `getFile` plus the file route.
#[derive(Clone, Default)]
pub struct FakeTelegram {
    pub calls: Arc<Mutex<Vec<TelegramCall>>>,
    pub rejected_sends: Arc<Mutex<usize>>,
    pub photo: Arc<Mutex<Option<Vec<u8>>>>,
}

impl FakeTelegram {
    pub fn reject_next_sends(&self, count: usize) {
        *self.rejected_sends.lock() = count;
    }

    pub fn serve_photo(&self, bytes: Vec<u8>) {
        *self.photo.lock() = Some(bytes);
    }

    /// Bodies of every `sendMessage` call, in order.
    pub fn sent_messages(&self) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == "sendmessage")
            .map(|call| call.body.clone())
            .collect()
    }

    pub async fn spawn(&self) -> Bot {
        let app = Router::new()
            .fallback(telegram_endpoint)
            .with_state(self.clone());
        let addr = spawn_router(app).await;
        let api_url = reqwest::Url::parse(&format!("http://{addr}")).unwrap();
        Bot::new(TEST_BOT_TOKEN).set_api_url(api_url)
    }
}

fn api_ok(result: Value) -> Response {
    Json(json!({ "ok": true, "result": result })).into_response()
}

fn api_error(description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "error_code": 400, "description": description })),
    )
        .into_response()
}

async fn telegram_endpoint(State(fake): State<FakeTelegram>, uri: Uri, body: String) -> Response {
    let path = uri.path();
    if path.starts_with("/file/") {
        return match fake.photo.lock().clone() {
            Some(bytes) => bytes.into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        };
    }

    let method = path.rsplit('/').next().unwrap_or_default().to_lowercase();
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    fake.calls.lock().push(TelegramCall {
        method: method.clone(),
        body: body.clone(),
    });

    match method.as_str() {
        "sendmessage" => {
            let mut rejected = fake.rejected_sends.lock();
            if *rejected > 0 {
                *rejected -= 1;
                return api_error("Bad Request: message is too long");
            }
            let text = body["text"].as_str().unwrap_or_default().to_string();
            api_ok(message_json(json!({ "message_id": 900, "text": text })))
        }
        "getfile" => match fake.photo.lock().as_ref() {
            Some(bytes) => api_ok(json!({
                "file_id": "photo-file",
                "file_unique_id": "photo-unique",
                "file_size": bytes.len(),
                "file_path": "photos/file_0.png"
            })),
            None => api_error("Bad Request: invalid file_id"),
        },
        _ => api_ok(json!(true)),
    }
}

/// A private-chat message in Bot API JSON, with `extra` merged on top.
pub fn message_json(extra: Value) -> Value {
    let mut message = json!({
        "message_id": 1,
        "date": 1_700_000_000,
        "chat": { "id": TEST_CHAT_ID, "type": "private", "first_name": "Test" },
        "from": { "id": TEST_CHAT_ID, "is_bot": false, "first_name": "Test" }
    });
    if let (Some(base), Some(extra)) = (message.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    message
}

pub fn text_message(text: &str) -> Message {
    serde_json::from_value(message_json(json!({ "text": text }))).unwrap()
}

pub fn photo_message(caption: Option<&str>) -> Message {
    let mut extra = json!({
        "photo": [
            { "file_id": "small", "file_unique_id": "small-u", "width": 1, "height": 1, "file_size": 10 },
            { "file_id": "photo-file", "file_unique_id": "photo-unique", "width": 3, "height": 2, "file_size": 100 }
        ]
    });
    if let Some(caption) = caption {
        extra["caption"] = json!(caption);
    }
    serde_json::from_value(message_json(extra)).unwrap()
}

pub fn test_config(gemini: SocketAddr) -> Config {
    Config::from_lookup(&move |name: &str| match name {
        "TELEGRAM_BOT_TOKEN" => Some(TEST_BOT_TOKEN.to_string()),
        "GOOGLE_API_KEY" => Some(TEST_API_KEY.to_string()),
        "GEMINI_API_BASE" => Some(format!("http://{gemini}")),
        "VISION_MODEL" => Some("vision-test".to_string()),
        "IMAGE_GEN_MODEL" => Some("image-test".to_string()),
        _ => None,
    })
    .unwrap()
}

pub async fn test_state(gemini: &FakeGemini) -> AppState {
    let addr = gemini.spawn().await;
    AppState::new(Arc::new(test_config(addr)))
}
