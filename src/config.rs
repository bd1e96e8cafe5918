use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ai_model: AiModelConfig,
    #[serde(default)]
    pub data_store: DataStoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    Openai,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AiModelConfig {
    pub provider: CompletionProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub temperature: Option<f32>,
    pub request_timeout_secs: u64,
}

impl Default for AiModelConfig {
    fn default() -> Self {
        Self {
            provider: CompletionProvider::Openai,
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            temperature: None,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    Supabase,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataStoreConfig {
    pub provider: StoreProvider,
    pub url: String,
    pub anon_key: String,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            provider: StoreProvider::Supabase,
            url: String::new(),
            anon_key: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Supabase,
    Static,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub provider: AuthProvider,
    /// token -> user id, used by the `static` provider
    pub static_tokens: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: AuthProvider::Supabase,
            static_tokens: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load from `path` when it exists, defaults otherwise, then apply
    /// environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.ai_model.api_key = key;
        }
        if let Some(url) = lookup("SUPABASE_URL") {
            self.data_store.url = url;
        }
        if let Some(key) = lookup("SUPABASE_ANON_KEY") {
            self.data_store.anon_key = key;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        Ok(())
    }

    /// Reject combinations that cannot serve a single turn.
    pub fn validate(&self) -> Result<()> {
        let needs_backend = self.data_store.provider == StoreProvider::Supabase
            || self.auth.provider == AuthProvider::Supabase;
        if needs_backend {
            anyhow::ensure!(
                !self.data_store.url.is_empty(),
                "data_store.url (or SUPABASE_URL) is required"
            );
            anyhow::ensure!(
                !self.data_store.anon_key.is_empty(),
                "data_store.anon_key (or SUPABASE_ANON_KEY) is required"
            );
        }
        if self.ai_model.provider == CompletionProvider::Openai {
            anyhow::ensure!(
                !self.ai_model.api_key.is_empty(),
                "ai_model.api_key (or OPENAI_API_KEY) is required"
            );
        }
        anyhow::ensure!(
            self.ai_model.request_timeout_secs > 0,
            "ai_model.request_timeout_secs must be positive"
        );
        Ok(())
    }
}
