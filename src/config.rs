use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_KEEP_ALIVE_INTERVAL_SECS: u64 = 240;
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-exp-image-generation";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub vision_model: String,
    pub image_model: String,
    pub gemini_safety_settings: String,
    pub port: u16,
    pub public_hostname: Option<String>,
    pub keep_alive_interval: Duration,
    pub telegram_max_length: usize,
}

fn env_string(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name).unwrap_or_else(|| default.to_string())
}

fn env_u64(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: usize) -> usize {
    lookup(name)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_port(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: u16) -> u16 {
    match lookup(name) {
        Some(value) => value.trim().parse::<u16>().unwrap_or_else(|_| {
            warn!("Invalid {name} value '{value}'; falling back to {default}.");
            default
        }),
        None => default,
    }
}

fn required(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    let value = lookup(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(anyhow!("{name} is required"));
    }
    Ok(value.trim().to_string())
}

fn normalize_hostname(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    let trimmed = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

/// Log level is needed before the rest of the configuration is validated,
/// so that a missing token can still be reported through the log.
pub fn log_level_from_env() -> String {
    env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(&|name: &str| env::var(name).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = required(lookup, "TELEGRAM_BOT_TOKEN")?;
        let gemini_api_key = required(lookup, "GOOGLE_API_KEY")?;

        let keep_alive_secs = env_u64(
            lookup,
            "KEEP_ALIVE_INTERVAL_SECONDS",
            DEFAULT_KEEP_ALIVE_INTERVAL_SECS,
        )
        .max(1);

        Ok(Config {
            bot_token,
            gemini_api_key,
            gemini_api_base: env_string(lookup, "GEMINI_API_BASE", DEFAULT_GEMINI_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            vision_model: env_string(lookup, "VISION_MODEL", DEFAULT_VISION_MODEL),
            image_model: env_string(lookup, "IMAGE_GEN_MODEL", DEFAULT_IMAGE_MODEL),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                lookup,
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            port: env_port(lookup, "PORT", DEFAULT_PORT),
            public_hostname: normalize_hostname(lookup("RENDER_EXTERNAL_HOSTNAME")),
            keep_alive_interval: Duration::from_secs(keep_alive_secs),
            telegram_max_length: env_usize(lookup, "TELEGRAM_MAX_LENGTH", 4000).max(100),
        })
    }

    /// Externally reachable base URL, if the hosting platform exposes one.
    pub fn public_base_url(&self) -> Option<String> {
        self.public_hostname
            .as_ref()
            .map(|host| format!("https://{host}"))
    }
}
