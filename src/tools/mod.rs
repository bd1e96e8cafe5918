pub mod board;
pub mod notes;

pub use board::{CreateBoardTile, ListBoardTiles, UpdateBoardTileStatus};
pub use notes::{CreateNote, ListNotes};

use once_cell::sync::Lazy;
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::Caller;
use crate::models::{ConversationMessage, TilePriority, TileStatus, ToolInvocation};
use crate::store::{DataStore, StoreError};

/// Tool trait for agent-orchestrated operations.
///
/// Not object-safe (associated types). The toolbox calls tools by concrete
/// type after matching on [`ToolRequest`], never through `dyn Tool`.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn name(&self) -> ToolName;
    async fn run(&self, caller: &Caller, input: Self::Input) -> Result<Self::Output, ToolError>;
}

/// Failure of a single tool invocation. Never fatal for the turn.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Board tile not found")]
    TileNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to encode tool output: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    CreateNote,
    CreateBoardTile,
    UpdateBoardTileStatus,
    GetBoardTiles,
    GetNotes,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::CreateNote,
        ToolName::CreateBoardTile,
        ToolName::UpdateBoardTileStatus,
        ToolName::GetBoardTiles,
        ToolName::GetNotes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::CreateNote => "create_note",
            ToolName::CreateBoardTile => "create_board_tile",
            ToolName::UpdateBoardTileStatus => "update_board_tile_status",
            ToolName::GetBoardTiles => "get_board_tiles",
            ToolName::GetNotes => "get_notes",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn declaration(self) -> Option<&'static ToolDeclaration> {
        DECLARATIONS.iter().find(|d| d.name == self)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool the model may request, described by a JSON schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: ToolName,
    pub description: &'static str,
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Function-tool shape expected by chat-completion endpoints.
    pub fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name.as_str(),
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

static DECLARATIONS: Lazy<Vec<ToolDeclaration>> = Lazy::new(build_declarations);

/// The fixed set of tools offered on the first completion call.
pub fn declarations() -> Vec<ToolDeclaration> {
    DECLARATIONS.clone()
}

fn build_declarations() -> Vec<ToolDeclaration> {
    let statuses = json!(["todo", "in-progress", "done"]);
    vec![
        ToolDeclaration {
            name: ToolName::CreateNote,
            description: "Create a new note with title and content",
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "The title of the note" },
                    "content": { "type": "string", "description": "The content/body of the note" }
                },
                "required": ["title", "content"]
            }),
        },
        ToolDeclaration {
            name: ToolName::CreateBoardTile,
            description: "Create a new board tile/task",
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "The title of the board tile" },
                    "description": { "type": "string", "description": "The description of the board tile" },
                    "status": {
                        "type": "string",
                        "enum": statuses.clone(),
                        "description": "The status of the board tile"
                    },
                    "priority": {
                        "type": "string",
                        "enum": ["low", "medium", "high"],
                        "description": "The priority level of the board tile"
                    }
                },
                "required": ["title"]
            }),
        },
        ToolDeclaration {
            name: ToolName::UpdateBoardTileStatus,
            description: "Update the status of an existing board tile",
            parameters: json!({
                "type": "object",
                "properties": {
                    "tile_id": { "type": "string", "description": "The ID of the board tile to update" },
                    "status": {
                        "type": "string",
                        "enum": statuses,
                        "description": "The new status for the board tile"
                    }
                },
                "required": ["tile_id", "status"]
            }),
        },
        ToolDeclaration {
            name: ToolName::GetBoardTiles,
            description: "Get all board tiles for the user",
            parameters: json!({ "type": "object", "properties": {}, "required": [] }),
        },
        ToolDeclaration {
            name: ToolName::GetNotes,
            description: "Get all notes for the user",
            parameters: json!({ "type": "object", "properties": {}, "required": [] }),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateNoteArgs {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateBoardTileArgs {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub status: Option<TileStatus>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub priority: Option<TilePriority>,
}

/// Read `null` and `""` as absent so the field falls back to its default.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => T::deserialize(s.into_deserializer()).map(Some),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateTileStatusArgs {
    pub tile_id: String,
    pub status: TileStatus,
}

/// A tool invocation whose arguments have been validated against the
/// tool's argument type. Owner-like fields supplied by the model are
/// dropped here, since no argument type declares one.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    CreateNote(CreateNoteArgs),
    CreateBoardTile(CreateBoardTileArgs),
    UpdateBoardTileStatus(UpdateTileStatusArgs),
    GetBoardTiles,
    GetNotes,
}

impl ToolRequest {
    /// Parse raw model arguments, then resolve the tool by name.
    ///
    /// Blank arguments are read as `{}`.
    pub fn parse(name: &str, raw_arguments: &str) -> Result<Self, ToolError> {
        let raw = raw_arguments.trim();
        let value: Value = if raw.is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
                tool: name.to_string(),
                reason: format!("arguments are not valid JSON ({})", e),
            })?
        };

        let tool = ToolName::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        check_required(tool, &value)?;
        match tool {
            ToolName::CreateNote => Ok(ToolRequest::CreateNote(typed_args(tool, value)?)),
            ToolName::CreateBoardTile => Ok(ToolRequest::CreateBoardTile(typed_args(tool, value)?)),
            ToolName::UpdateBoardTileStatus => {
                Ok(ToolRequest::UpdateBoardTileStatus(typed_args(tool, value)?))
            }
            ToolName::GetBoardTiles => Ok(ToolRequest::GetBoardTiles),
            ToolName::GetNotes => Ok(ToolRequest::GetNotes),
        }
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolRequest::CreateNote(_) => ToolName::CreateNote,
            ToolRequest::CreateBoardTile(_) => ToolName::CreateBoardTile,
            ToolRequest::UpdateBoardTileStatus(_) => ToolName::UpdateBoardTileStatus,
            ToolRequest::GetBoardTiles => ToolName::GetBoardTiles,
            ToolRequest::GetNotes => ToolName::GetNotes,
        }
    }
}

/// Reject arguments missing a parameter the declaration marks as required.
fn check_required(tool: ToolName, value: &Value) -> Result<(), ToolError> {
    let Some(declaration) = tool.declaration() else {
        return Ok(());
    };
    for param in declaration.required_parameters() {
        if value.get(param).map_or(true, Value::is_null) {
            return Err(ToolError::InvalidArguments {
                tool: tool.to_string(),
                reason: format!("missing required parameter `{}`", param),
            });
        }
    }
    Ok(())
}

fn typed_args<T: DeserializeOwned>(tool: ToolName, value: Value) -> Result<T, ToolError> {
    serde_json::from_value(value).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

/// Successful tool output as reported back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub data: Value,
    pub message: String,
    pub count: Option<usize>,
}

/// Outcome of one invocation, tagged with the call id it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub success: bool,
    pub data: Option<Value>,
    pub count: Option<usize>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, outcome: ToolOutcome) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            success: true,
            data: Some(outcome.data),
            count: outcome.count,
            message: Some(outcome.message),
            error: None,
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            success: false,
            data: None,
            count: None,
            message: None,
            error: Some(error.into()),
        }
    }

    /// JSON body sent to the model as the tool message content.
    pub fn to_json(&self) -> Value {
        let mut body = json!({ "success": self.success });
        if let Some(data) = &self.data {
            body["data"] = data.clone();
        }
        if let Some(count) = self.count {
            body["count"] = json!(count);
        }
        if let Some(message) = &self.message {
            body["message"] = json!(message);
        }
        if let Some(error) = &self.error {
            body["error"] = json!(error);
        }
        body
    }

    pub fn into_message(self) -> ConversationMessage {
        let content = self.to_json().to_string();
        ConversationMessage::tool(self.tool_call_id, content)
    }
}

/// Concrete tool handlers sharing one data store.
pub struct Toolbox {
    create_note: CreateNote,
    list_notes: ListNotes,
    create_board_tile: CreateBoardTile,
    update_board_tile_status: UpdateBoardTileStatus,
    list_board_tiles: ListBoardTiles,
}

impl Toolbox {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            create_note: CreateNote::new(store.clone()),
            list_notes: ListNotes::new(store.clone()),
            create_board_tile: CreateBoardTile::new(store.clone()),
            update_board_tile_status: UpdateBoardTileStatus::new(store.clone()),
            list_board_tiles: ListBoardTiles::new(store),
        }
    }

    /// Run one invocation for `caller`. Every failure is folded into the result.
    pub async fn execute(&self, caller: &Caller, invocation: &ToolInvocation) -> ToolResult {
        log::info!("Executing tool: {} ({})", invocation.name(), invocation.id);
        log::debug!("Tool {} arguments: {}", invocation.name(), invocation.raw_arguments());

        let outcome = match ToolRequest::parse(invocation.name(), invocation.raw_arguments()) {
            Ok(request) => {
                log::debug!("Dispatching {} for user {}", request.tool(), caller.user_id);
                self.dispatch(caller, request).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(outcome) => ToolResult::success(&invocation.id, outcome),
            Err(e) => {
                log::warn!("Tool {} failed: {}", invocation.name(), e);
                ToolResult::failure(&invocation.id, e.to_string())
            }
        }
    }

    async fn dispatch(&self, caller: &Caller, request: ToolRequest) -> Result<ToolOutcome, ToolError> {
        match request {
            ToolRequest::CreateNote(args) => {
                let note = self.create_note.run(caller, args).await?;
                Ok(ToolOutcome {
                    message: format!("Note \"{}\" created successfully", note.title),
                    data: serde_json::to_value(&note)?,
                    count: None,
                })
            }
            ToolRequest::CreateBoardTile(args) => {
                let tile = self.create_board_tile.run(caller, args).await?;
                Ok(ToolOutcome {
                    message: format!("Board tile \"{}\" created successfully", tile.title),
                    data: serde_json::to_value(&tile)?,
                    count: None,
                })
            }
            ToolRequest::UpdateBoardTileStatus(args) => {
                let tile = self.update_board_tile_status.run(caller, args).await?;
                Ok(ToolOutcome {
                    message: format!("Board tile status updated to \"{}\"", tile.status),
                    data: serde_json::to_value(&tile)?,
                    count: None,
                })
            }
            ToolRequest::GetBoardTiles => {
                let tiles = self.list_board_tiles.run(caller, ()).await?;
                Ok(ToolOutcome {
                    message: format!("Found {} board tiles", tiles.len()),
                    count: Some(tiles.len()),
                    data: serde_json::to_value(&tiles)?,
                })
            }
            ToolRequest::GetNotes => {
                let notes = self.list_notes.run(caller, ()).await?;
                Ok(ToolOutcome {
                    message: format!("Found {} notes", notes.len()),
                    count: Some(notes.len()),
                    data: serde_json::to_value(&notes)?,
                })
            }
        }
    }
}
