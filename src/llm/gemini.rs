use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::truncate_for_log;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(90);
const STREAM_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, thiserror::Error)]
#[error("Gemini returned no text (finish reason: {finish_reason}, block reason: {block_reason})")]
pub struct EmptyResponseError {
    pub finish_reason: String,
    pub block_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        general_purpose::STANDARD
            .decode(self.data.as_bytes())
            .context("Gemini returned invalid base64 image data")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Other(Value),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn image(mime_type: &str, bytes: &[u8]) -> Self {
        Part::InlineData {
            inline_data: InlineData::from_bytes(mime_type, bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
    }

    /// Concatenated text of every text part, in order.
    pub fn text(&self) -> String {
        self.parts()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn first_image(&self) -> Option<&InlineData> {
        self.parts().find_map(|part| match part {
            Part::InlineData { inline_data } if inline_data.mime_type.starts_with("image/") => {
                Some(inline_data)
            }
            _ => None,
        })
    }

    fn empty_error(&self) -> EmptyResponseError {
        let finish_reason = self
            .candidates
            .as_deref()
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.finish_reason.clone())
            .unwrap_or_else(|| "none".to_string());
        let block_reason = self
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.clone())
            .unwrap_or_else(|| "none".to_string());
        EmptyResponseError {
            finish_reason,
            block_reason,
        }
    }

    /// Text of the response, or an error when the provider produced none
    /// (typically a safety block).
    pub fn require_text(&self) -> Result<String> {
        let text = self.text();
        if text.trim().is_empty() {
            return Err(self.empty_error().into());
        }
        Ok(text)
    }
}

/// Outcome of an image generation request. Suppression by the provider's
/// filters is a normal result rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedImage {
    Image { bytes: Vec<u8>, mime_type: String },
    Suppressed,
}

impl GeneratedImage {
    pub fn from_response(response: &GenerateContentResponse) -> Result<Self> {
        match response.first_image() {
            Some(inline_data) => Ok(GeneratedImage::Image {
                bytes: inline_data.decode()?,
                mime_type: inline_data.mime_type.clone(),
            }),
            None => Ok(GeneratedImage::Suppressed),
        }
    }
}

/// Joins the text of every `data:` event in a Gemini SSE body. Returns the
/// last parsed chunk too, for its finish and block reasons.
async fn collect_stream_text<S, B, E>(body: S) -> Result<(String, GenerateContentResponse)>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut events = pin!(body.eventsource());
    let mut text = String::new();
    let mut last_chunk = GenerateContentResponse::default();

    while let Some(event) = events.next().await {
        let event = event.map_err(|err| anyhow!("Gemini stream interrupted: {err}"))?;
        if event.data.trim().is_empty() {
            continue;
        }
        last_chunk =
            serde_json::from_str(&event.data).context("failed to parse Gemini stream chunk")?;
        text.push_str(&last_chunk.text());
    }
    Ok((text, last_chunk))
}

fn build_safety_settings(profile: &str) -> Vec<Value> {
    let threshold = match profile {
        "permissive" => "OFF",
        _ => "BLOCK_MEDIUM_AND_ABOVE",
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn summarize_parts(parts: &[Part]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            Part::Text { text } => json!({ "text": truncate_for_log(text, 200) }),
            Part::InlineData { inline_data } => json!({
                "inlineData": {
                    "mimeType": inline_data.mime_type,
                    "dataLen": inline_data.data.len()
                }
            }),
            Part::Other(_) => json!({ "unknownPart": true }),
        })
        .collect()
}

fn summarize_contents(contents: &[Content]) -> Value {
    Value::Array(
        contents
            .iter()
            .map(|content| json!({ "role": content.role, "parts": summarize_parts(&content.parts) }))
            .collect(),
    )
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// Thin REST client for the Gemini `generateContent` family of endpoints.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: Arc<str>,
    api_base: Arc<str>,
    safety_profile: Arc<str>,
    vision_model: Arc<str>,
    image_model: Arc<str>,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            api_key: Arc::from(config.gemini_api_key.as_str()),
            api_base: Arc::from(config.gemini_api_base.as_str()),
            safety_profile: Arc::from(config.gemini_safety_settings.as_str()),
            vision_model: Arc::from(config.vision_model.as_str()),
            image_model: Arc::from(config.image_model.as_str()),
        }
    }

    pub fn vision_model(&self) -> &str {
        &self.vision_model
    }

    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, method)
    }

    fn build_payload(&self, contents: &[Content], generation_config: Option<Value>) -> Value {
        let mut payload = Map::new();
        payload.insert("contents".to_string(), json!(contents));
        payload.insert(
            "safetySettings".to_string(),
            Value::Array(build_safety_settings(&self.safety_profile)),
        );
        if let Some(config) = generation_config {
            payload.insert("generationConfig".to_string(), config);
        }
        Value::Object(payload)
    }

    async fn post(&self, url: &str, payload: &Value, timeout: Duration) -> Result<reqwest::Response> {
        let response = get_http_client()
            .post(url)
            .header("x-goog-api-key", self.api_key.as_ref())
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                anyhow!("Gemini request failed: {}", err_text)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                self.redact(&detail)
            ));
        }

        Ok(response)
    }

    pub async fn generate_content(
        &self,
        model: &str,
        contents: &[Content],
        generation_config: Option<Value>,
    ) -> Result<GenerateContentResponse> {
        let payload = self.build_payload(contents, generation_config);
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = model, contents = %summarize_contents(contents));
        }

        let url = self.endpoint(model, "generateContent");
        let metadata = json!({ "turns": contents.len() });
        log_llm_timing("gemini", model, "generate_content", Some(metadata), || async move {
            let response = self.post(&url, &payload, GENERATE_TIMEOUT).await?;
            let value = response
                .json::<GenerateContentResponse>()
                .await
                .context("failed to parse Gemini response")?;
            debug!(
                target: "llm.gemini",
                model = model,
                text_len = value.text().len(),
                has_image = value.first_image().is_some(),
                "Gemini response received"
            );
            Ok(value)
        })
        .await
    }

    /// Streams a reply and returns every text fragment joined together.
    pub async fn stream_generate_content(&self, model: &str, contents: &[Content]) -> Result<String> {
        let payload = self.build_payload(contents, None);
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = model, contents = %summarize_contents(contents));
        }

        let url = format!("{}?alt=sse", self.endpoint(model, "streamGenerateContent"));
        let metadata = json!({ "turns": contents.len() });
        log_llm_timing("gemini", model, "stream_generate_content", Some(metadata), || async move {
            let response = self.post(&url, &payload, STREAM_TIMEOUT).await?;
            let (text, last_chunk) = collect_stream_text(response.bytes_stream())
                .await
                .map_err(|err| anyhow!(self.redact(&format!("{err:#}"))))?;
            if text.trim().is_empty() {
                return Err(last_chunk.empty_error().into());
            }
            Ok(text)
        })
        .await
    }

    /// Single-turn request to the image model. `image` turns the request
    /// into an edit of that picture.
    pub async fn generate_image(
        &self,
        prompt: &str,
        image: Option<(&str, &[u8])>,
    ) -> Result<GeneratedImage> {
        let mut parts = vec![Part::text(prompt)];
        if let Some((mime_type, bytes)) = image {
            parts.push(Part::image(mime_type, bytes));
        }
        let generation_config = json!({ "responseModalities": ["TEXT", "IMAGE"] });
        let model = self.image_model.clone();
        let response = self
            .generate_content(&model, &[Content::user(parts)], Some(generation_config))
            .await?;
        GeneratedImage::from_response(&response)
    }
}

/// Ordered turn history for one conversation with the vision model.
/// Task-scoped exchanges create a throwaway session; chat dialogues keep
/// theirs in the session store.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    history: Vec<Content>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Sends one user turn. History only grows when the model answers;
    /// a failed turn leaves it as it was.
    pub async fn send_message(&mut self, client: &GeminiClient, parts: Vec<Part>) -> Result<String> {
        self.history.push(Content::user(parts));
        let result = match client
            .generate_content(client.vision_model(), &self.history, None)
            .await
        {
            Ok(response) => response.require_text(),
            Err(err) => Err(err),
        };
        self.finish_turn(result)
    }

    pub async fn send_message_streamed(&mut self, client: &GeminiClient, text: &str) -> Result<String> {
        self.history.push(Content::user(vec![Part::text(text)]));
        let result = client
            .stream_generate_content(client.vision_model(), &self.history)
            .await;
        self.finish_turn(result)
    }

    /// Drops the latest user turn and the model's answer to it.
    pub fn forget_last_exchange(&mut self) {
        let keep = self.history.len().saturating_sub(2);
        self.history.truncate(keep);
    }

    fn finish_turn(&mut self, result: Result<String>) -> Result<String> {
        match result {
            Ok(reply) => {
                self.history.push(Content::model_text(reply.clone()));
                Ok(reply)
            }
            Err(err) => {
                self.history.pop();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, text_response, FakeGemini};

    async fn spawn_fake(fake: FakeGemini) -> GeminiClient {
        GeminiClient::new(&test_config(fake.spawn().await))
    }

    #[test]
    fn parts_serialize_in_gemini_wire_format() {
        let text = serde_json::to_value(Part::text("hi")).unwrap();
        assert_eq!(text, json!({ "text": "hi" }));

        let image = serde_json::to_value(Part::image("image/png", &[1, 2, 3])).unwrap();
        assert_eq!(
            image,
            json!({ "inlineData": { "mimeType": "image/png", "data": "AQID" } })
        );
    }

    #[test]
    fn response_text_joins_text_parts_and_skips_images() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "Hello, " },
                    { "inlineData": { "mimeType": "image/png", "data": "AQID" } },
                    { "text": "world" }
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(response.text(), "Hello, world");
        assert_eq!(response.first_image().unwrap().decode().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn response_without_image_parts_is_suppressed() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "I can't draw that." }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(
            GeneratedImage::from_response(&response).unwrap(),
            GeneratedImage::Suppressed
        );

        let empty = GenerateContentResponse::default();
        assert_eq!(
            GeneratedImage::from_response(&empty).unwrap(),
            GeneratedImage::Suppressed
        );
    }

    #[test]
    fn non_image_inline_data_is_not_treated_as_image() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "audio/wav", "data": "AQID" } },
                { "inlineData": { "mimeType": "image/jpeg", "data": "BAUG" } }
            ]}}]
        }))
        .unwrap();
        assert_eq!(response.first_image().unwrap().mime_type, "image/jpeg");
    }

    #[test]
    fn blocked_prompt_reports_block_reason() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        let err = response.require_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn unknown_parts_do_not_break_parsing() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "functionCall": { "name": "noop", "args": {} } },
                { "text": "ok" }
            ]}}]
        }))
        .unwrap();
        assert_eq!(response.text(), "ok");
    }

    #[test]
    fn error_body_summary_prefers_provider_message() {
        let (message, _) = summarize_error_body(r#"{"error":{"message":"API key not valid"}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid"));
        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn safety_profile_maps_to_threshold() {
        let permissive = build_safety_settings("permissive");
        assert!(permissive.iter().all(|entry| entry["threshold"] == "OFF"));
        let standard = build_safety_settings("standard");
        assert!(standard
            .iter()
            .all(|entry| entry["threshold"] == "BLOCK_MEDIUM_AND_ABOVE"));
    }

    #[tokio::test]
    async fn chat_session_grows_by_two_turns_per_exchange() {
        let fake = FakeGemini::default();
        fake.replies
            .lock()
            .insert("generateContent".to_string(), text_response("A cat on a sofa."));
        let client = spawn_fake(fake.clone()).await;

        let mut session = ChatSession::new();
        let first = session
            .send_message(
                &client,
                vec![Part::text("Проанализируй это изображение."), Part::image("image/png", &[7])],
            )
            .await
            .unwrap();
        assert_eq!(first, "A cat on a sofa.");
        session
            .send_message(&client, vec![Part::text("keywords only")])
            .await
            .unwrap();
        assert_eq!(session.len(), 4);

        let requests = fake.requests.lock();
        let second_contents = requests[1]["contents"].as_array().unwrap();
        assert_eq!(second_contents.len(), 3);
        assert_eq!(second_contents[1]["role"], "model");
    }

    #[tokio::test]
    async fn failed_turn_is_rolled_back() {
        let client = spawn_fake(FakeGemini::default()).await;
        let mut session = ChatSession::new();
        let err = session
            .send_message_streamed(&client, "hello")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(session.is_empty());
    }

    #[test]
    fn forgetting_an_exchange_keeps_earlier_turns() {
        let mut session = ChatSession::new();
        session.history.push(Content::user(vec![Part::text("one")]));
        session.history.push(Content::model_text("first"));
        session.history.push(Content::user(vec![Part::text("two")]));
        session.history.push(Content::model_text("second"));

        session.forget_last_exchange();
        assert_eq!(session.len(), 2);
        assert_eq!(session.history[1], Content::model_text("first"));

        session.forget_last_exchange();
        session.forget_last_exchange();
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn stream_events_split_across_chunks_are_reassembled() {
        let body = format!(
            "data: {}\r\n\r\ndata: {}\r\n\r\n",
            text_response("Привет, "),
            text_response("мир!")
        )
        .into_bytes();
        let cut = body.iter().position(|byte| *byte >= 0x80).unwrap() + 1;
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(body[..cut].to_vec()),
            Ok(body[cut..cut + 7].to_vec()),
            Ok(body[cut + 7..].to_vec()),
        ];

        let (text, last_chunk) = collect_stream_text(futures_util::stream::iter(chunks))
            .await
            .unwrap();
        assert_eq!(text, "Привет, мир!");
        assert_eq!(last_chunk.text(), "мир!");
    }

    #[tokio::test]
    async fn malformed_stream_chunk_is_an_error() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> =
            vec![Ok(b"data: not json\n\n".to_vec())];
        let err = collect_stream_text(futures_util::stream::iter(chunks))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stream chunk"));
    }

    #[tokio::test]
    async fn streamed_reply_concatenates_fragments() {
        let fake = FakeGemini::default();
        let body = format!(
            "data: {}\r\n\r\ndata: {}\r\n\r\n",
            text_response("Привет"),
            text_response(", мир!")
        );
        fake.replies
            .lock()
            .insert("streamGenerateContent".to_string(), body);
        let client = spawn_fake(fake).await;

        let mut session = ChatSession::new();
        let reply = session.send_message_streamed(&client, "Привет!").await.unwrap();
        assert_eq!(reply, "Привет, мир!");
        assert_eq!(session.history[1], Content::model_text("Привет, мир!"));
    }

    #[tokio::test]
    async fn generate_image_sends_prompt_and_image_in_one_turn() {
        let fake = FakeGemini::default();
        fake.replies.lock().insert(
            "generateContent".to_string(),
            json!({ "candidates": [{ "content": { "parts": [
                { "text": "Here you go" },
                { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
            ]}}]})
            .to_string(),
        );
        let client = spawn_fake(fake.clone()).await;

        let result = client
            .generate_image("redraw it", Some(("image/jpeg", &[9, 9])))
            .await
            .unwrap();
        assert_eq!(
            result,
            GeneratedImage::Image {
                bytes: vec![1, 2, 3],
                mime_type: "image/png".to_string()
            }
        );

        let requests = fake.requests.lock();
        let contents = requests[0]["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(
            requests[0]["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[tokio::test]
    async fn provider_errors_do_not_leak_the_api_key() {
        let client = spawn_fake(FakeGemini::default()).await;
        let err = client.generate_image("cat", None).await.unwrap_err();
        assert!(!err.to_string().contains("secret-key"));
    }
}
