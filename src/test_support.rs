//! Test doubles for the orchestrator's collaborators.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::{Caller, IdentityProvider, StaticTokens};
use crate::models::{BoardTile, ConversationMessage, NewBoardTile, NewNote, Note, TileStatus};
use crate::openai::{CompletionEndpoint, CompletionError, CompletionRequest};
use crate::store::{DataStore, MemoryStore, StoreError};

/// `token-u1` -> `U1`, `token-u2` -> `U2`.
pub fn static_identity() -> Arc<dyn IdentityProvider> {
    let tokens = HashMap::from([
        ("token-u1".to_string(), "U1".to_string()),
        ("token-u2".to_string(), "U2".to_string()),
    ]);
    Arc::new(StaticTokens::new(tokens))
}

/// Replies with canned messages in order and records every request.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<ConversationMessage>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<ConversationMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionEndpoint for ScriptedCompletion {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<ConversationMessage, CompletionError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CompletionError::Malformed("no scripted reply left".to_string()))
    }
}

/// Never answers within a reasonable time.
pub struct SlowCompletion(pub Duration);

#[async_trait]
impl CompletionEndpoint for SlowCompletion {
    fn model(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<ConversationMessage, CompletionError> {
        tokio::time::sleep(self.0).await;
        Ok(ConversationMessage::assistant("too late"))
    }
}

/// In-memory store that logs when each operation starts and ends.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    events: Mutex<Vec<String>>,
}

impl RecordingStore {
    /// Direct access for seeding and inspection; not recorded.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: &str, op: &str) {
        self.events.lock().unwrap().push(format!("{} {}", event, op));
    }
}

#[async_trait]
impl DataStore for RecordingStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn insert_note(&self, caller: &Caller, note: NewNote) -> Result<Note, StoreError> {
        self.record("start", "insert_note");
        tokio::task::yield_now().await;
        let out = self.inner.insert_note(caller, note).await;
        self.record("end", "insert_note");
        out
    }

    async fn list_notes(&self, caller: &Caller) -> Result<Vec<Note>, StoreError> {
        self.record("start", "list_notes");
        tokio::task::yield_now().await;
        let out = self.inner.list_notes(caller).await;
        self.record("end", "list_notes");
        out
    }

    async fn insert_board_tile(&self, caller: &Caller, tile: NewBoardTile) -> Result<BoardTile, StoreError> {
        self.record("start", "insert_board_tile");
        tokio::task::yield_now().await;
        let out = self.inner.insert_board_tile(caller, tile).await;
        self.record("end", "insert_board_tile");
        out
    }

    async fn update_board_tile_status(
        &self,
        caller: &Caller,
        tile_id: &str,
        status: TileStatus,
    ) -> Result<Option<BoardTile>, StoreError> {
        self.record("start", "update_board_tile_status");
        tokio::task::yield_now().await;
        let out = self.inner.update_board_tile_status(caller, tile_id, status).await;
        self.record("end", "update_board_tile_status");
        out
    }

    async fn list_board_tiles(&self, caller: &Caller) -> Result<Vec<BoardTile>, StoreError> {
        self.record("start", "list_board_tiles");
        tokio::task::yield_now().await;
        let out = self.inner.list_board_tiles(caller).await;
        self.record("end", "list_board_tiles");
        out
    }
}
