use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::llm::gemini::ChatSession;
use crate::prompts::PhotoTask;

/// A dialogue shared between the store and the handler running a turn.
/// The inner lock is held for the whole turn, so turns for one chat never
/// interleave.
pub type SharedChat = Arc<tokio::sync::Mutex<ChatSession>>;

/// What the next message from a chat is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    AwaitPhoto(PhotoTask),
}

#[derive(Default)]
struct Sessions {
    dialogues: HashMap<i64, SharedChat>,
    pending: HashMap<i64, PendingAction>,
}

/// In-memory per-chat state: the running dialogue with the vision model and
/// the pending follow-up action. Nothing here survives a restart.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<Sessions>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, chat_id: i64) -> SharedChat {
        self.inner
            .lock()
            .dialogues
            .entry(chat_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(ChatSession::new())))
            .clone()
    }

    pub fn contains(&self, chat_id: i64) -> bool {
        self.inner.lock().dialogues.contains_key(&chat_id)
    }

    pub fn active_dialogues(&self) -> usize {
        self.inner.lock().dialogues.len()
    }

    /// Drops the chat's dialogue. Returns whether one existed.
    pub fn clear(&self, chat_id: i64) -> bool {
        self.inner.lock().dialogues.remove(&chat_id).is_some()
    }

    /// Registers the follow-up for the chat's next message, replacing any
    /// earlier one.
    pub fn arm_pending(&self, chat_id: i64, action: PendingAction) -> Option<PendingAction> {
        self.inner.lock().pending.insert(chat_id, action)
    }

    pub fn take_pending(&self, chat_id: i64) -> Option<PendingAction> {
        self.inner.lock().pending.remove(&chat_id)
    }
}
