use std::sync::Arc;

use super::{CreateBoardTileArgs, Tool, ToolError, ToolName, UpdateTileStatusArgs};
use crate::auth::Caller;
use crate::models::{BoardTile, NewBoardTile};
use crate::store::DataStore;

/// Inserts a board tile owned by the caller, defaulting to `todo` / `medium`.
pub struct CreateBoardTile {
    store: Arc<dyn DataStore>,
}

impl CreateBoardTile {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for CreateBoardTile {
    type Input = CreateBoardTileArgs;
    type Output = BoardTile;

    fn name(&self) -> ToolName {
        ToolName::CreateBoardTile
    }

    async fn run(&self, caller: &Caller, args: CreateBoardTileArgs) -> Result<BoardTile, ToolError> {
        let tile = NewBoardTile {
            title: args.title,
            description: args.description.filter(|d| !d.is_empty()),
            status: args.status.unwrap_or_default(),
            priority: args.priority.unwrap_or_default(),
            user_id: caller.user_id.clone(),
        };
        let tile = self.store.insert_board_tile(caller, tile).await?;

        log::info!("{}: saved tile {} for user {}", self.name(), tile.id, caller.user_id);
        Ok(tile)
    }
}

/// Moves one of the caller's tiles to a new status.
///
/// A tile owned by another user is reported exactly like a missing one.
pub struct UpdateBoardTileStatus {
    store: Arc<dyn DataStore>,
}

impl UpdateBoardTileStatus {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateBoardTileStatus {
    type Input = UpdateTileStatusArgs;
    type Output = BoardTile;

    fn name(&self) -> ToolName {
        ToolName::UpdateBoardTileStatus
    }

    async fn run(&self, caller: &Caller, args: UpdateTileStatusArgs) -> Result<BoardTile, ToolError> {
        self.store
            .update_board_tile_status(caller, &args.tile_id, args.status)
            .await?
            .ok_or(ToolError::TileNotFound)
    }
}

/// Lists the caller's tiles, newest first.
pub struct ListBoardTiles {
    store: Arc<dyn DataStore>,
}

impl ListBoardTiles {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for ListBoardTiles {
    type Input = ();
    type Output = Vec<BoardTile>;

    fn name(&self) -> ToolName {
        ToolName::GetBoardTiles
    }

    async fn run(&self, caller: &Caller, _input: ()) -> Result<Vec<BoardTile>, ToolError> {
        let tiles = self.store.list_board_tiles(caller).await?;
        log::info!("{}: found {} tiles", self.name(), tiles.len());
        Ok(tiles)
    }
}
