//! Self-ping loop that keeps free-tier hosts from idling the process.

use std::time::Duration;

use reqwest::Client;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::utils::http::get_http_client;

pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

pub fn ping_url(base_url: &str) -> String {
    format!("{}/ping", base_url.trim_end_matches('/'))
}

/// Best-effort GET. Every failure is swallowed; the return value only
/// says whether the endpoint answered with a success status.
pub async fn ping_once(client: &Client, url: &str) -> bool {
    match client.get(url).timeout(PING_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// Runs until the process exits. Without a public URL there is nothing to
/// ping, so the loop is skipped entirely.
pub async fn run(base_url: Option<String>, every: Duration) {
    let Some(base_url) = base_url else {
        warn!("No public hostname configured (RENDER_EXTERNAL_HOSTNAME); keep-alive is disabled.");
        return;
    };

    let url = ping_url(&base_url);
    info!("Keep-alive pinging {} every {:?}", url, every);

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        ping_once(get_http_client(), &url).await;
    }
}
