use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AuthConfig, AuthProvider, DataStoreConfig};

/// Authenticated user a turn runs on behalf of.
///
/// Keeps the bearer credential so row-level security in the data store
/// sees the same user.
#[derive(Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    access_token: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Credential rejected ({0})")]
    Rejected(u16),

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Resolves a bearer credential to a user identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn resolve(&self, credential: &str) -> Result<Caller, AuthError>;
}

/// Build the identity provider selected in the configuration.
pub fn create_identity_provider(
    auth: &AuthConfig,
    data_store: &DataStoreConfig,
) -> Arc<dyn IdentityProvider> {
    match auth.provider {
        AuthProvider::Supabase => Arc::new(SupabaseAuth::new(
            data_store.url.clone(),
            data_store.anon_key.clone(),
        )),
        AuthProvider::Static => Arc::new(StaticTokens::new(auth.static_tokens.clone())),
    }
}

/// Hosted auth service: `GET {url}/auth/v1/user` with the user's bearer token.
pub struct SupabaseAuth {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Option<String>,
}

impl SupabaseAuth {
    pub fn new(base_url: String, anon_key: String) -> Self {
        Self {
            base_url,
            anon_key,
            client: reqwest::Client::new(),
        }
    }

    fn user_url(&self) -> String {
        format!("{}/auth/v1/user", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn resolve(&self, credential: &str) -> Result<Caller, AuthError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let response = self
            .client
            .get(self.user_url())
            .header("apikey", &self.anon_key)
            .bearer_auth(credential)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected(status.as_u16()));
        }

        let user: AuthUser = response.json().await?;
        match user.id {
            Some(id) if !id.is_empty() => Ok(Caller::new(id, credential)),
            _ => Err(AuthError::UnknownCredential),
        }
    }
}

/// Fixed token -> user id table, for local runs against the in-memory store.
pub struct StaticTokens {
    tokens: HashMap<String, String>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokens {
    fn name(&self) -> &str {
        "static"
    }

    async fn resolve(&self, credential: &str) -> Result<Caller, AuthError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.tokens
            .get(credential)
            .map(|user_id| Caller::new(user_id.clone(), credential))
            .ok_or(AuthError::UnknownCredential)
    }
}
