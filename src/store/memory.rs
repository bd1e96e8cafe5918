use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DataStore, StoreError};
use crate::auth::Caller;
use crate::models::{BoardTile, NewBoardTile, NewNote, Note, TileStatus};

/// Process-local store for development and tests.
///
/// Rows are kept in insertion order; listings sort stably so rows sharing a
/// timestamp still come back newest first.
#[derive(Default)]
pub struct MemoryStore {
    notes: Mutex<Vec<Note>>,
    tiles: Mutex<Vec<BoardTile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_note(&self, _caller: &Caller, note: NewNote) -> Result<Note, StoreError> {
        let now = Utc::now();
        let row = Note {
            id: Uuid::new_v4().to_string(),
            title: note.title,
            content: note.content,
            user_id: note.user_id,
            created_at: now,
            updated_at: now,
        };
        self.notes.lock().await.push(row.clone());
        Ok(row)
    }

    async fn list_notes(&self, caller: &Caller) -> Result<Vec<Note>, StoreError> {
        let notes = self.notes.lock().await;
        let mut owned: Vec<Note> = notes
            .iter()
            .rev()
            .filter(|n| n.user_id == caller.user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(owned)
    }

    async fn insert_board_tile(
        &self,
        _caller: &Caller,
        tile: NewBoardTile,
    ) -> Result<BoardTile, StoreError> {
        let now = Utc::now();
        let row = BoardTile {
            id: Uuid::new_v4().to_string(),
            title: tile.title,
            description: tile.description,
            status: tile.status,
            priority: tile.priority,
            user_id: tile.user_id,
            created_at: now,
            updated_at: now,
        };
        self.tiles.lock().await.push(row.clone());
        Ok(row)
    }

    async fn update_board_tile_status(
        &self,
        caller: &Caller,
        tile_id: &str,
        status: TileStatus,
    ) -> Result<Option<BoardTile>, StoreError> {
        let mut tiles = self.tiles.lock().await;
        let Some(tile) = tiles
            .iter_mut()
            .find(|t| t.id == tile_id && t.user_id == caller.user_id)
        else {
            return Ok(None);
        };
        tile.status = status;
        tile.updated_at = Utc::now();
        Ok(Some(tile.clone()))
    }

    async fn list_board_tiles(&self, caller: &Caller) -> Result<Vec<BoardTile>, StoreError> {
        let tiles = self.tiles.lock().await;
        let mut owned: Vec<BoardTile> = tiles
            .iter()
            .rev()
            .filter(|t| t.user_id == caller.user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}
