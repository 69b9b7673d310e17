//! Minimal HTTP surface probed by the hosting platform and the keep-alive
//! pinger.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub const LIVENESS_BODY: &str = "Bot is alive and running!";
pub const PING_BODY: &str = "pong";

async fn home() -> &'static str {
    LIVENESS_BODY
}

async fn ping() -> (StatusCode, &'static str) {
    (StatusCode::OK, PING_BODY)
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(home))
        .route("/ping", get(ping))
}

pub async fn serve(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind liveness server on {addr}"))?;
    info!("Liveness server listening on http://{}", addr);
    serve_listener(listener).await
}

pub async fn serve_listener(listener: TcpListener) -> Result<()> {
    axum::serve(listener, router())
        .await
        .context("liveness server stopped")
}

#[cfg(test)]
pub(crate) async fn spawn_for_test() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve_listener(listener).await.unwrap();
    });
    addr
}
