use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::application::ingestion::{DEFAULT_SPLIT_LENGTH, DEFAULT_SPLIT_OVERLAP};
use crate::application::{PromptTemplate, DEFAULT_TOP_K};
use crate::domain::DomainError;

/// Settings without which nothing can be constructed.
pub const REQUIRED_VARS: [&str; 8] = [
    "DB_CONN_STR",
    "DB_USERNAME",
    "DB_PASSWORD",
    "DB_BUCKET",
    "DB_SCOPE",
    "DB_COLLECTION",
    "INDEX_NAME",
    "OPENAI_API_KEY",
];

pub const DEFAULT_PROMPTS_PATH: &str = "config/prompts.yaml";

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config: Config,
    pub prompts: PromptsConfig,
}

impl AppConfig {
    /// Reads the environment and the prompts file. Any problem is a
    /// configuration error, raised before a single network call is made.
    pub fn load() -> Result<Self, DomainError> {
        let config = Config::from_env()?;
        let prompts = PromptsConfig::load(&config.prompts_path)?;
        Ok(Self { config, prompts })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub rag: RagConfig,
    pub server: ServerConfig,
    pub prompts_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub username: String,
    pub password: Secret,
    pub bucket: String,
    pub scope: String,
    pub collection: String,
    pub index_name: String,
    pub document_ttl_seconds: u64,
}

/// The API key itself is read from `OPENAI_API_KEY` by the provider client;
/// it is only checked for presence here.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub top_k: usize,
    pub split_length: usize,
    pub split_overlap: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, DomainError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Every missing required key
    /// is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(DomainError::configuration(format!(
                "missing required environment variable(s): {}. Set them in the environment or a .env file",
                missing.join(", ")
            )));
        }
        let required = |key: &str| get(key).unwrap_or_default();

        let rag = RagConfig {
            top_k: parse_or(&get, "RAG_TOP_K", DEFAULT_TOP_K)?,
            split_length: parse_or(&get, "SPLIT_LENGTH", DEFAULT_SPLIT_LENGTH)?,
            split_overlap: parse_or(&get, "SPLIT_OVERLAP", DEFAULT_SPLIT_OVERLAP)?,
        };
        if rag.top_k == 0 {
            return Err(DomainError::configuration("RAG_TOP_K must be positive"));
        }
        if rag.split_length == 0 || rag.split_overlap >= rag.split_length {
            return Err(DomainError::configuration(
                "SPLIT_OVERLAP must be smaller than a positive SPLIT_LENGTH",
            ));
        }

        Ok(Self {
            database: DatabaseConfig {
                connection_string: required("DB_CONN_STR"),
                username: required("DB_USERNAME"),
                password: Secret::new(required("DB_PASSWORD")),
                bucket: required("DB_BUCKET"),
                scope: required("DB_SCOPE"),
                collection: required("DB_COLLECTION"),
                index_name: required("INDEX_NAME"),
                document_ttl_seconds: parse_or(&get, "DOCUMENT_TTL_SECONDS", 3600)?,
            },
            llm: LlmConfig {
                model: get("LLM_MODEL").unwrap_or_else(|| "gpt-4o".into()),
                timeout_seconds: parse_or(&get, "LLM_TIMEOUT_SECONDS", 60)?,
            },
            embedding: EmbeddingConfig {
                model: get("EMBEDDING_MODEL").unwrap_or_else(|| "text-embedding-3-small".into()),
                dimension: parse_or(&get, "EMBEDDING_DIMENSION", 1536)?,
            },
            rag,
            server: ServerConfig {
                host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
                port: parse_or(&get, "SERVER_PORT", 8080)?,
                allowed_origins: get("CORS_ALLOWED_ORIGINS")
                    .map(|v| {
                        v.split(',')
                            .map(|o| o.trim().to_string())
                            .filter(|o| !o.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            prompts_path: get("PROMPTS_PATH")
                .unwrap_or_else(|| DEFAULT_PROMPTS_PATH.into())
                .into(),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, DomainError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DomainError::configuration(format!("{key}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub rag: PromptTemplate,
}

impl PromptsConfig {
    /// A missing file means built-in prompts; an unreadable or invalid one
    /// is an error.
    pub fn load(path: &Path) -> Result<Self, DomainError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no prompts file, using built-in prompts");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, DomainError> {
        let prompts: Self = serde_yaml::from_str(raw)
            .map_err(|e| DomainError::configuration(format!("invalid prompts file: {e}")))?;
        prompts.rag.validate()?;
        Ok(prompts)
    }
}
