use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::auth::{self, Caller, IdentityProvider};
use crate::config::Config;
use crate::models::{ConversationMessage, ToolInvocation};
use crate::openai::{self, CompletionEndpoint, CompletionError, CompletionRequest};
use crate::store::{self, DataStore};
use crate::tools::{self, ToolResult, Toolbox};

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant that can help users manage their notes and board tiles/tasks. You have access to tools that allow you to:
- Create new notes
- Create new board tiles/tasks
- Update board tile status
- View existing notes and board tiles

When users ask you to create something, use the appropriate tool. Be conversational and helpful. Always confirm what you've done after using a tool.";

/// Completion call a turn is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    FirstCompletion,
    SecondCompletion,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnPhase::FirstCompletion => f.write_str("first completion"),
            TurnPhase::SecondCompletion => f.write_str("second completion"),
        }
    }
}

/// Errors that abort a whole turn. Tool failures never end up here.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{phase} failed: {source}")]
    Completion {
        phase: TurnPhase,
        #[source]
        source: CompletionError,
    },

    #[error("{phase} timed out after {secs}s")]
    Timeout { phase: TurnPhase, secs: u64 },
}

/// Tool-calling orchestrator: one assistant reply per turn, with at most one
/// round of tool execution between two completion calls.
///
/// Multi-round tool chains are not supported; tool calls in the second
/// completion's reply are returned to the caller unexecuted.
pub struct AssistantAgent {
    completion: Arc<dyn CompletionEndpoint>,
    identity: Arc<dyn IdentityProvider>,
    toolbox: Toolbox,
    completion_timeout: Duration,
}

impl AssistantAgent {
    pub fn new(config: &Config) -> Self {
        let completion = openai::create_completion_endpoint(&config.ai_model);
        let identity = auth::create_identity_provider(&config.auth, &config.data_store);
        let store = store::create_data_store(&config.data_store);
        log::info!(
            "Assistant using model {}, {} data store, {} identity provider",
            completion.model(),
            store.name(),
            identity.name()
        );

        Self::with_parts(
            completion,
            identity,
            store,
            Duration::from_secs(config.ai_model.request_timeout_secs),
        )
    }

    pub fn with_parts(
        completion: Arc<dyn CompletionEndpoint>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DataStore>,
        completion_timeout: Duration,
    ) -> Self {
        Self {
            completion,
            identity,
            toolbox: Toolbox::new(store),
            completion_timeout,
        }
    }

    /// Produce the assistant's reply to `messages` on behalf of the user
    /// identified by `credential`.
    pub async fn handle_turn(
        &self,
        messages: Vec<ConversationMessage>,
        credential: &str,
    ) -> Result<ConversationMessage, TurnError> {
        let caller = self.identity.resolve(credential).await.map_err(|e| {
            log::warn!("Rejected credential via {}: {}", self.identity.name(), e);
            TurnError::Unauthorized
        })?;
        log::info!("Processing request for user: {}", caller.user_id);

        let mut conversation = Vec::with_capacity(messages.len() + 1);
        conversation.push(ConversationMessage::system(SYSTEM_PROMPT));
        conversation.extend(messages);

        let reply = self
            .complete(TurnPhase::FirstCompletion, conversation.clone(), tools::declarations())
            .await?;

        let invocations = reply.invocations().to_vec();
        if invocations.is_empty() {
            log::info!("Reply for user {} needed no tools", caller.user_id);
            return Ok(reply);
        }

        log::info!("Model requested {} tool call(s)", invocations.len());
        let results = self.execute_tools(&caller, &invocations).await;

        conversation.push(reply);
        conversation.extend(results.into_iter().map(ToolResult::into_message));

        self.complete(TurnPhase::SecondCompletion, conversation, Vec::new())
            .await
    }

    /// Run invocations strictly in order; each one finishes before the next starts.
    async fn execute_tools(&self, caller: &Caller, invocations: &[ToolInvocation]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(invocations.len());
        for invocation in invocations {
            results.push(self.toolbox.execute(caller, invocation).await);
        }
        let failed = results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            log::warn!("{} of {} tool call(s) failed", failed, results.len());
        }
        results
    }

    async fn complete(
        &self,
        phase: TurnPhase,
        messages: Vec<ConversationMessage>,
        tools: Vec<tools::ToolDeclaration>,
    ) -> Result<ConversationMessage, TurnError> {
        let request = CompletionRequest { messages, tools };
        match tokio::time::timeout(self.completion_timeout, self.completion.complete(request)).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(source)) => Err(TurnError::Completion { phase, source }),
            Err(_) => Err(TurnError::Timeout {
                phase,
                secs: self.completion_timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::store::MemoryStore;
    use crate::test_support::{static_identity, RecordingStore, ScriptedCompletion, SlowCompletion};

    fn agent(completion: Arc<ScriptedCompletion>, store: Arc<RecordingStore>) -> AssistantAgent {
        AssistantAgent::with_parts(completion, static_identity(), store, Duration::from_secs(5))
    }

    fn groceries_call() -> ToolInvocation {
        ToolInvocation::new(
            "call_1",
            "create_note",
            r#"{"title": "Groceries", "content": "Milk, Eggs", "user_id": "U2"}"#,
        )
    }

    #[tokio::test]
    async fn test_tool_free_reply_is_returned_unchanged() {
        let reply = ConversationMessage::assistant("Hi! How can I help?");
        let completion = Arc::new(ScriptedCompletion::new(vec![reply.clone()]));
        let store = Arc::new(RecordingStore::default());
        let agent = agent(completion.clone(), store.clone());

        let out = agent
            .handle_turn(vec![ConversationMessage::user("hello")], "token-u1")
            .await
            .unwrap();

        assert_eq!(out, reply);
        assert!(store.events().is_empty());

        let requests = completion.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[0].content.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(requests[0].tools.len(), 5);
    }

    #[tokio::test]
    async fn test_refusal_reply_keeps_provider_fields() {
        let wire = serde_json::json!({
            "role": "assistant",
            "content": null,
            "refusal": "I can't help with that.",
            "annotations": []
        });
        let reply: ConversationMessage = serde_json::from_value(wire.clone()).unwrap();
        let completion = Arc::new(ScriptedCompletion::new(vec![reply]));
        let agent = agent(completion, Arc::new(RecordingStore::default()));

        let out = agent
            .handle_turn(vec![ConversationMessage::user("hello")], "token-u1")
            .await
            .unwrap();

        assert_eq!(serde_json::to_value(&out).unwrap(), wire);
    }

    #[tokio::test]
    async fn test_create_tile_with_explicit_status() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            ConversationMessage::assistant_tool_calls(vec![ToolInvocation::new(
                "call_1",
                "create_board_tile",
                r#"{"title": "Write report", "status": "done", "priority": ""}"#,
            )]),
            ConversationMessage::assistant("Added it as done."),
        ]));
        let store = Arc::new(RecordingStore::default());
        let agent = agent(completion.clone(), store.clone());

        agent
            .handle_turn(vec![ConversationMessage::user("log the finished report")], "token-u1")
            .await
            .unwrap();

        let tiles = store.inner().list_board_tiles(&Caller::new("U1", "token-u1")).await.unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].status, crate::models::TileStatus::Done);
        assert_eq!(tiles[0].priority, crate::models::TilePriority::Medium);

        let tool_msg = &completion.requests()[1].messages[3];
        let body: serde_json::Value = serde_json::from_str(tool_msg.content.as_deref().unwrap()).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "done");
    }

    #[tokio::test]
    async fn test_empty_history_still_gets_system_prompt() {
        let completion = Arc::new(ScriptedCompletion::new(vec![ConversationMessage::assistant("Hello")]));
        let agent = agent(completion.clone(), Arc::new(RecordingStore::default()));

        agent.handle_turn(Vec::new(), "token-u1").await.unwrap();
        let requests = completion.requests();
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_create_note_scenario() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            ConversationMessage::assistant_tool_calls(vec![groceries_call()]),
            ConversationMessage::assistant("I've created your Groceries note."),
        ]));
        let store = Arc::new(RecordingStore::default());
        let agent = agent(completion.clone(), store.clone());

        let out = agent
            .handle_turn(
                vec![ConversationMessage::user(
                    "Create a note called Groceries with content Milk, Eggs",
                )],
                "token-u1",
            )
            .await
            .unwrap();
        assert_eq!(out.content.as_deref(), Some("I've created your Groceries note."));

        let notes = store.inner().list_notes(&Caller::new("U1", "token-u1")).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].user_id, "U1");
        assert_eq!(notes[0].title, "Groceries");
        assert_eq!(notes[0].content, "Milk, Eggs");

        let requests = completion.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert!(second.tools.is_empty());
        // system, user, assistant(tool_calls), tool
        assert_eq!(second.messages.len(), 4);
        assert_eq!(second.messages[2].invocations(), &[groceries_call()]);
        let tool_msg = &second.messages[3];
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        let body: serde_json::Value = serde_json::from_str(tool_msg.content.as_deref().unwrap()).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["user_id"], "U1");
        assert_eq!(body["message"], "Note \"Groceries\" created successfully");
    }

    #[tokio::test]
    async fn test_invalid_credential_makes_no_calls() {
        let completion = Arc::new(ScriptedCompletion::new(Vec::new()));
        let store = Arc::new(RecordingStore::default());
        let agent = agent(completion.clone(), store.clone());

        let err = agent
            .handle_turn(vec![ConversationMessage::user("hi")], "forged")
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Unauthorized));
        assert_eq!(err.to_string(), "Unauthorized");
        assert!(completion.requests().is_empty());
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn test_tools_run_sequentially_in_order() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            ConversationMessage::assistant_tool_calls(vec![
                groceries_call(),
                ToolInvocation::new("call_2", "get_notes", "{}"),
            ]),
            ConversationMessage::assistant("Done."),
        ]));
        let store = Arc::new(RecordingStore::default());
        let agent = agent(completion.clone(), store.clone());

        agent
            .handle_turn(vec![ConversationMessage::user("go")], "token-u1")
            .await
            .unwrap();

        assert_eq!(
            store.events(),
            vec![
                "start insert_note",
                "end insert_note",
                "start list_notes",
                "end list_notes",
            ]
        );

        // The listing observes the note created by the first call.
        let second = &completion.requests()[1];
        let listing: serde_json::Value =
            serde_json::from_str(second.messages[4].content.as_deref().unwrap()).unwrap();
        assert_eq!(listing["count"], 1);
        assert_eq!(second.messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(second.messages[4].tool_call_id.as_deref(), Some("call_2"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_do_not_abort_turn() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            ConversationMessage::assistant_tool_calls(vec![
                ToolInvocation::new("call_1", "create_board_tile", "{\"title\": \"unterminated"),
                ToolInvocation::new("call_2", "summon_dragon", "{}"),
                ToolInvocation::new("call_3", "get_board_tiles", "{}"),
            ]),
            ConversationMessage::assistant("One request could not be completed."),
        ]));
        let store = Arc::new(RecordingStore::default());
        let agent = agent(completion.clone(), store.clone());

        let out = agent
            .handle_turn(vec![ConversationMessage::user("go")], "token-u1")
            .await
            .unwrap();
        assert_eq!(out.content.as_deref(), Some("One request could not be completed."));

        let second = &completion.requests()[1];
        let bodies: Vec<serde_json::Value> = second.messages[3..]
            .iter()
            .map(|m| serde_json::from_str(m.content.as_deref().unwrap()).unwrap())
            .collect();
        assert_eq!(bodies[0]["success"], false);
        assert_eq!(bodies[1]["error"], "Unknown tool: summon_dragon");
        assert_eq!(bodies[2]["success"], true);
        assert_eq!(store.events(), vec!["start list_board_tiles", "end list_board_tiles"]);
    }

    #[tokio::test]
    async fn test_update_missing_tile_still_reaches_second_completion() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            ConversationMessage::assistant_tool_calls(vec![ToolInvocation::new(
                "call_1",
                "update_board_tile_status",
                r#"{"tile_id": "nonexistent", "status": "done"}"#,
            )]),
            ConversationMessage::assistant("I couldn't find that tile."),
        ]));
        let agent = agent(completion.clone(), Arc::new(RecordingStore::default()));

        let out = agent
            .handle_turn(vec![ConversationMessage::user("finish it")], "token-u1")
            .await
            .unwrap();
        assert_eq!(out.content.as_deref(), Some("I couldn't find that tile."));

        let tool_msg = &completion.requests()[1].messages[3];
        let body: serde_json::Value = serde_json::from_str(tool_msg.content.as_deref().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "success": false, "error": "Board tile not found" }));
    }

    #[tokio::test]
    async fn test_updating_another_users_tile_fails() {
        let store = Arc::new(RecordingStore::default());
        let foreign = store
            .inner()
            .insert_board_tile(
                &Caller::new("U2", "token-u2"),
                crate::models::NewBoardTile {
                    title: "Theirs".to_string(),
                    description: None,
                    status: Default::default(),
                    priority: Default::default(),
                    user_id: "U2".to_string(),
                },
            )
            .await
            .unwrap();

        let args = serde_json::json!({ "tile_id": foreign.id, "status": "done" }).to_string();
        let completion = Arc::new(ScriptedCompletion::new(vec![
            ConversationMessage::assistant_tool_calls(vec![ToolInvocation::new(
                "call_1",
                "update_board_tile_status",
                args,
            )]),
            ConversationMessage::assistant("Not found."),
        ]));
        let agent = agent(completion.clone(), store.clone());
        agent
            .handle_turn(vec![ConversationMessage::user("close it")], "token-u1")
            .await
            .unwrap();

        let tool_msg = &completion.requests()[1].messages[3];
        assert!(tool_msg.content.as_deref().unwrap().contains("\"success\":false"));
        let theirs = store.inner().list_board_tiles(&Caller::new("U2", "token-u2")).await.unwrap();
        assert_eq!(theirs[0].status, crate::models::TileStatus::Todo);
    }

    #[tokio::test]
    async fn test_repeated_listing_is_consistent() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            ConversationMessage::assistant_tool_calls(vec![
                ToolInvocation::new("a", "get_notes", "{}"),
                ToolInvocation::new("b", "get_notes", "{}"),
            ]),
            ConversationMessage::assistant("ok"),
        ]));
        let store = Arc::new(RecordingStore::default());
        store
            .inner()
            .insert_note(
                &Caller::new("U1", "token-u1"),
                crate::models::NewNote {
                    title: "Existing".to_string(),
                    content: "x".to_string(),
                    user_id: "U1".to_string(),
                },
            )
            .await
            .unwrap();
        let agent = agent(completion.clone(), store.clone());
        agent
            .handle_turn(vec![ConversationMessage::user("list twice")], "token-u1")
            .await
            .unwrap();

        let messages = &completion.requests()[1].messages;
        let first: serde_json::Value = serde_json::from_str(messages[3].content.as_deref().unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_str(messages[4].content.as_deref().unwrap()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.events().len(), 4);
    }

    #[tokio::test]
    async fn test_completion_failure_is_fatal() {
        let completion = Arc::new(ScriptedCompletion::new(Vec::new()));
        let agent = agent(completion, Arc::new(RecordingStore::default()));
        let err = agent
            .handle_turn(vec![ConversationMessage::user("hi")], "token-u1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TurnError::Completion {
                phase: TurnPhase::FirstCompletion,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_second_completion_failure_is_fatal() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            ConversationMessage::assistant_tool_calls(vec![groceries_call()]),
        ]));
        let store = Arc::new(RecordingStore::default());
        let agent = agent(completion, store.clone());
        let err = agent
            .handle_turn(vec![ConversationMessage::user("hi")], "token-u1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TurnError::Completion {
                phase: TurnPhase::SecondCompletion,
                ..
            }
        ));
        // The tool already ran; no rollback is attempted.
        assert_eq!(store.events(), vec!["start insert_note", "end insert_note"]);
    }

    #[tokio::test]
    async fn test_completion_timeout() {
        let agent = AssistantAgent::with_parts(
            Arc::new(SlowCompletion(Duration::from_secs(5))),
            static_identity(),
            Arc::new(MemoryStore::new()),
            Duration::from_millis(50),
        );
        let err = agent
            .handle_turn(vec![ConversationMessage::user("hi")], "token-u1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TurnError::Timeout {
                phase: TurnPhase::FirstCompletion,
                ..
            }
        ));
    }
}
