pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::Caller;
use crate::config::{DataStoreConfig, StoreProvider};
use crate::models::{BoardTile, NewBoardTile, NewNote, Note, TileStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Data store unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected data store response: {0}")]
    Decode(String),
}

/// CRUD access to notes and board tiles, scoped to one caller.
///
/// Every query filters by `caller.user_id`; a row owned by someone else is
/// indistinguishable from a missing one.
#[async_trait]
pub trait DataStore: Send + Sync {
    fn name(&self) -> &str;

    async fn insert_note(&self, caller: &Caller, note: NewNote) -> Result<Note, StoreError>;

    /// Caller's notes, most recently updated first.
    async fn list_notes(&self, caller: &Caller) -> Result<Vec<Note>, StoreError>;

    async fn insert_board_tile(
        &self,
        caller: &Caller,
        tile: NewBoardTile,
    ) -> Result<BoardTile, StoreError>;

    /// `Ok(None)` when no tile matched both the id and the caller.
    async fn update_board_tile_status(
        &self,
        caller: &Caller,
        tile_id: &str,
        status: TileStatus,
    ) -> Result<Option<BoardTile>, StoreError>;

    /// Caller's tiles, newest created first.
    async fn list_board_tiles(&self, caller: &Caller) -> Result<Vec<BoardTile>, StoreError>;
}

/// Build the data store selected in the configuration.
pub fn create_data_store(config: &DataStoreConfig) -> Arc<dyn DataStore> {
    match config.provider {
        StoreProvider::Supabase => Arc::new(RestStore::new(
            config.url.clone(),
            config.anon_key.clone(),
        )),
        StoreProvider::Memory => {
            log::warn!("Using in-memory data store; rows are lost on restart");
            Arc::new(MemoryStore::new())
        }
    }
}
