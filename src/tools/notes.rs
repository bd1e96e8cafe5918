use std::sync::Arc;

use super::{CreateNoteArgs, Tool, ToolError, ToolName};
use crate::auth::Caller;
use crate::models::{NewNote, Note};
use crate::store::DataStore;

/// Inserts a note owned by the caller.
pub struct CreateNote {
    store: Arc<dyn DataStore>,
}

impl CreateNote {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for CreateNote {
    type Input = CreateNoteArgs;
    type Output = Note;

    fn name(&self) -> ToolName {
        ToolName::CreateNote
    }

    async fn run(&self, caller: &Caller, args: CreateNoteArgs) -> Result<Note, ToolError> {
        let note = self
            .store
            .insert_note(
                caller,
                NewNote {
                    title: args.title,
                    content: args.content,
                    user_id: caller.user_id.clone(),
                },
            )
            .await?;

        log::info!("{}: saved note {} for user {}", self.name(), note.id, caller.user_id);
        Ok(note)
    }
}

/// Lists the caller's notes, most recently updated first.
pub struct ListNotes {
    store: Arc<dyn DataStore>,
}

impl ListNotes {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for ListNotes {
    type Input = ();
    type Output = Vec<Note>;

    fn name(&self) -> ToolName {
        ToolName::GetNotes
    }

    async fn run(&self, caller: &Caller, _input: ()) -> Result<Vec<Note>, ToolError> {
        let notes = self.store.list_notes(caller).await?;
        log::info!("{}: found {} notes", self.name(), notes.len());
        Ok(notes)
    }
}
