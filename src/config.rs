use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    /// Per-file upload ceiling in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            index_dir: default_index_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("data/index")
}
fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// `memory` or `redis`.
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Default TTL applied when a caller does not request one.
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
    /// TTL for the cached schema snapshot.
    #[serde(default = "default_schema_ttl")]
    pub schema_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            redis_url: default_redis_url(),
            default_ttl_secs: default_cache_ttl(),
            schema_ttl_secs: default_schema_ttl(),
        }
    }
}

fn default_cache_backend() -> String {
    "memory".to_string()
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_schema_ttl() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Optional default connection URL. The HTTP `connect` endpoint and the
    /// CLI can both override this at runtime.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    /// `http` for the hosted chat-completions backend, `disabled` otherwise.
    #[serde(default = "default_generator_provider")]
    pub provider: String,
    #[serde(default = "default_generator_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_generator_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_generator_provider(),
            endpoint: default_generator_endpoint(),
            model: default_generator_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_generator_timeout(),
        }
    }
}

fn default_generator_provider() -> String {
    "disabled".to_string()
}
fn default_generator_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_generator_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "ASKDB_API_KEY".to_string()
}
fn default_generator_timeout() -> u64 {
    30
}

impl Config {
    /// Minimal in-memory configuration used by tests and scratch commands.
    pub fn minimal() -> Self {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            database: DatabaseConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }

    /// Path of the serialized keyword index.
    pub fn index_file(&self) -> PathBuf {
        self.storage.index_dir.join("keyword_index.json")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.storage.max_upload_bytes == 0 {
        anyhow::bail!("storage.max_upload_bytes must be > 0");
    }

    if config.cache.default_ttl_secs == 0 {
        anyhow::bail!("cache.default_ttl_secs must be > 0");
    }

    match config.cache.backend.as_str() {
        "memory" | "redis" => {}
        other => anyhow::bail!("Unknown cache backend: '{}'. Must be memory or redis.", other),
    }

    match config.generator.provider.as_str() {
        "disabled" | "http" => {}
        other => anyhow::bail!(
            "Unknown generator provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    if config.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be > 0");
    }

    Ok(config)
}
