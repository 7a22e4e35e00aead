//! Chore Quest
//!
//! Backend for a family chore-gamification app:
//! - Real-time AI chat over WebSocket with a first-frame auth handshake
//! - Durable per-party chat history
//! - AI suggestion lifecycle with exactly-once materialization into chore
//!   templates and learning goals
//! - SQLite (or in-memory) persistence behind the `FamilyStore` trait
//! - A reconnecting chat client

pub mod ai;
pub mod api;
pub mod auth;
pub mod chat;
pub mod client;
pub mod events;
pub mod store;
pub mod suggestions;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use ai::{DisabledAiProvider, HttpAiProvider, MockAiProvider, ReplyGenerator, SuggestionGenerator};
use api::handlers::{ServerState, SharedState};
use store::{FamilyStore, MemoryStore, SqliteStore};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub storage: StorageYamlConfig,
    pub ai: AiYamlConfig,
    pub chat: ChatYamlConfig,
    /// Auth section; if absent the server runs in open mode
    pub auth: Option<AuthConfig>,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
    /// CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("Unknown storage backend: {}", other),
        }
    }
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageYamlConfig {
    pub backend: StorageBackend,
    pub database_url: String,
}

impl Default for StorageYamlConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_url: "sqlite://chore-quest.db".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderKind {
    /// OpenAI-compatible HTTP endpoint
    Http,
    /// Scripted echo provider (local development)
    Mock,
    Disabled,
}

impl FromStr for AiProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(AiProviderKind::Http),
            "mock" => Ok(AiProviderKind::Mock),
            "disabled" => Ok(AiProviderKind::Disabled),
            other => anyhow::bail!("Unknown AI provider: {}", other),
        }
    }
}

/// AI provider configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiYamlConfig {
    /// Explicit provider; inferred from `url` when absent
    pub provider: Option<AiProviderKind>,
    pub url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for AiYamlConfig {
    fn default() -> Self {
        Self {
            provider: None,
            url: None,
            model: "gpt-4o-mini".into(),
            api_key: None,
        }
    }
}

/// Chat configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatYamlConfig {
    /// Default `limit` for the history endpoint
    pub history_limit: usize,
    /// Messages of prior context handed to the reply generator
    pub context_limit: usize,
}

impl Default for ChatYamlConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            context_limit: 20,
        }
    }
}

/// Authentication configuration.
///
/// When present, WebSocket handshakes and `/api` requests must carry a JWT
/// naming the caller's party.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// JWT signing secret (HS256, minimum 32 characters)
    pub jwt_secret: String,
    /// JWT token lifetime in seconds (default: 28800 = 8h)
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_secs: u64,
}

fn default_jwt_expiry() -> u64 {
    28800 // 8 hours
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub allowed_origins: Vec<String>,
    pub storage_backend: StorageBackend,
    pub database_url: String,
    pub ai_provider: AiProviderKind,
    pub ai_url: Option<String>,
    pub ai_model: String,
    pub ai_api_key: Option<String>,
    pub chat_history_limit: usize,
    pub chat_context_limit: usize,
    /// None means open mode (declared identities are trusted)
    pub auth_config: Option<AuthConfig>,
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let storage_backend = match env_opt("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => yaml.storage.backend,
        };
        let ai_url = env_opt("AI_URL").or(yaml.ai.url).filter(|u| !u.is_empty());
        let ai_provider = match env_opt("AI_PROVIDER") {
            Some(value) => value.parse()?,
            None => yaml.ai.provider.unwrap_or(if ai_url.is_some() {
                AiProviderKind::Http
            } else {
                AiProviderKind::Disabled
            }),
        };

        let mut auth_config = yaml.auth;
        if let Some(secret) = env_opt("JWT_SECRET") {
            match auth_config.as_mut() {
                Some(auth) => auth.jwt_secret = secret,
                None => {
                    auth_config = Some(AuthConfig {
                        jwt_secret: secret,
                        jwt_expiry_secs: default_jwt_expiry(),
                    })
                }
            }
        }
        let auth_config = auth_config.filter(|auth| !auth.jwt_secret.is_empty());

        Ok(Self {
            server_port: env_parse("SERVER_PORT").unwrap_or(yaml.server.port),
            allowed_origins: yaml.server.allowed_origins,
            storage_backend,
            database_url: env_opt("DATABASE_URL").unwrap_or(yaml.storage.database_url),
            ai_provider,
            ai_url,
            ai_model: env_opt("AI_MODEL").unwrap_or(yaml.ai.model),
            ai_api_key: env_opt("AI_API_KEY").or(yaml.ai.api_key),
            chat_history_limit: yaml.chat.history_limit,
            chat_context_limit: yaml.chat.context_limit,
            auth_config,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    pub fn jwt_secret(&self) -> Option<&str> {
        self.auth_config.as_ref().map(|auth| auth.jwt_secret.as_str())
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_opt(name).and_then(|v| v.parse().ok())
}

// ============================================================================
// Startup
// ============================================================================

/// Open the configured store
pub async fn build_store(config: &Config) -> Result<Arc<dyn FamilyStore>> {
    match config.storage_backend {
        StorageBackend::Sqlite => Ok(Arc::new(SqliteStore::connect(&config.database_url).await?)),
        StorageBackend::Memory => {
            warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Build the configured AI provider as both generator seams
pub fn build_ai(
    config: &Config,
) -> Result<(Arc<dyn ReplyGenerator>, Arc<dyn SuggestionGenerator>)> {
    match (config.ai_provider, config.ai_url.as_ref()) {
        (AiProviderKind::Http, Some(url)) => {
            let provider = Arc::new(HttpAiProvider::new(
                url.clone(),
                config.ai_model.clone(),
                config.ai_api_key.clone(),
            )?);
            info!(%url, model = provider.model_name(), "Using HTTP AI provider");
            Ok(both_seams(provider))
        }
        (AiProviderKind::Http, None) => {
            anyhow::bail!("ai.provider is http but no ai.url / AI_URL is set")
        }
        (AiProviderKind::Mock, _) => {
            warn!("Using mock AI provider");
            Ok(both_seams(Arc::new(MockAiProvider::new())))
        }
        (AiProviderKind::Disabled, _) => {
            warn!("No AI provider configured; chat replies and suggestions will fail");
            Ok(both_seams(Arc::new(DisabledAiProvider)))
        }
    }
}

fn both_seams<P>(provider: Arc<P>) -> (Arc<dyn ReplyGenerator>, Arc<dyn SuggestionGenerator>)
where
    P: ReplyGenerator + SuggestionGenerator + 'static,
{
    let replies: Arc<dyn ReplyGenerator> = provider.clone();
    let generator: Arc<dyn SuggestionGenerator> = provider;
    (replies, generator)
}

/// Serve the API on an already-bound listener until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = api::create_router(state.clone());
    let cancel = state.shutdown.clone();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            // Long-lived sockets would otherwise hold the server open
            cancel.cancel();
        })
        .await
        .context("Server exited with an error")
}

/// Start the HTTP + WebSocket server
pub async fn start_server(config: Config) -> Result<()> {
    let store = build_store(&config).await?;
    let (replies, generator) = build_ai(&config)?;
    let state = Arc::new(ServerState::from_config(&config, store, replies, generator));

    if state.verifier.is_open() {
        warn!("No auth.jwt_secret configured; running in open mode");
    }

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Chore Quest server listening on {}", addr);

    serve(listener, state, shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}

/// Completes on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

// ============================================================================
// Tests
// ============================================================================
