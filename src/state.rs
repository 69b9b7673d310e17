use std::sync::Arc;

use crate::config::Config;
use crate::llm::GeminiClient;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gemini: GeminiClient,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let gemini = GeminiClient::new(&config);
        AppState {
            config,
            gemini,
            sessions: SessionStore::new(),
        }
    }
}
