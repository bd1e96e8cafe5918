use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{DataStore, StoreError};
use crate::auth::Caller;
use crate::models::{BoardTile, NewBoardTile, NewNote, Note, TileStatus};

const NOTES: &str = "notes";
const BOARD_TILES: &str = "board_tiles";

/// Postgres `invalid_text_representation`, raised for a malformed uuid.
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

/// PostgREST data store (`{url}/rest/v1/<table>`).
///
/// Requests carry the project anon key plus the caller's own bearer token,
/// so row-level security applies on top of the explicit owner filters.
pub struct RestStore {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

impl RestStore {
    pub fn new(base_url: String, anon_key: String) -> Self {
        Self {
            base_url,
            anon_key,
            client: reqwest::Client::new(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }

    fn request(&self, method: Method, table: &str, caller: &Caller) -> RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(caller.access_token())
    }

    fn owner_filter(caller: &Caller) -> (&'static str, String) {
        ("user_id", format!("eq.{}", caller.user_id))
    }

    async fn rows<T: DeserializeOwned>(response: Response) -> Result<Vec<T>, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<PostgrestError>(&body) {
                Ok(err) => (err.code, err.message.unwrap_or(body)),
                Err(_) => (None, body),
            };
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                code,
                message,
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn insert_one<T, B>(&self, table: &str, caller: &Caller, row: &B) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
        B: serde::Serialize + Sync,
    {
        let response = self
            .request(Method::POST, table, caller)
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;

        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("insert into {} returned no row", table)))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        table: &str,
        caller: &Caller,
        order: &str,
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .request(Method::GET, table, caller)
            .query(&[("select", "*".to_string()), Self::owner_filter(caller)])
            .query(&[("order", order)])
            .send()
            .await?;

        Self::rows(response).await
    }
}

#[async_trait]
impl DataStore for RestStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn insert_note(&self, caller: &Caller, note: NewNote) -> Result<Note, StoreError> {
        self.insert_one(NOTES, caller, &note).await
    }

    async fn list_notes(&self, caller: &Caller) -> Result<Vec<Note>, StoreError> {
        self.list(NOTES, caller, "updated_at.desc").await
    }

    async fn insert_board_tile(
        &self,
        caller: &Caller,
        tile: NewBoardTile,
    ) -> Result<BoardTile, StoreError> {
        self.insert_one(BOARD_TILES, caller, &tile).await
    }

    async fn update_board_tile_status(
        &self,
        caller: &Caller,
        tile_id: &str,
        status: TileStatus,
    ) -> Result<Option<BoardTile>, StoreError> {
        let response = self
            .request(Method::PATCH, BOARD_TILES, caller)
            .header("Prefer", "return=representation")
            .query(&[("id", format!("eq.{}", tile_id)), Self::owner_filter(caller)])
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await?;

        match Self::rows::<BoardTile>(response).await {
            Ok(rows) => Ok(rows.into_iter().next()),
            Err(StoreError::Rejected { code: Some(code), .. })
                if code == INVALID_TEXT_REPRESENTATION =>
            {
                // An id that is not even a uuid cannot match a row.
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_board_tiles(&self, caller: &Caller) -> Result<Vec<BoardTile>, StoreError> {
        self.list(BOARD_TILES, caller, "created_at.desc").await
    }
}
