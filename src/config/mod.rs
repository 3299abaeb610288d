use crate::{Result, SpiralError};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub rag: RagConfig,
    pub agents: AgentsConfig,
    pub security: SecurityConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProviderKind {
    Remote,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub enabled: bool,
    pub embedding_provider: EmbeddingProviderKind,
    pub embedding_dimension: u32,
    pub embedding_base_url: String,
    /// `None` disables RAG with a startup warning rather than failing.
    pub embedding_api_key: Option<String>,
    pub chat_model: String,
    pub chat_base_url: String,
    pub chat_api_key: Option<String>,
    pub interval_seconds: u64,
    pub max_results: usize,
    /// Filesystem roots walked for markdown/code sources. Empty means the
    /// indexer only pulls DB-derived sources (tasks, context, messages).
    pub index_roots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    pub max_workers: usize,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanitizeMode {
    Remove,
    Neutralize,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub enabled: bool,
    pub sanitize_mode: SanitizeMode,
    pub alert_webhook: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from: {:?}", path),
            Err(e) => tracing::debug!("no .env file loaded: {}", e),
        }

        let api = ApiConfig {
            host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("API_PORT", 8080)?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let pool_min: u32 = env_parse("DB_POOL_MIN", 1)?;
        let pool_max: u32 = env_parse("DB_POOL_MAX", 10)?;
        if pool_min > pool_max {
            return Err(SpiralError::ConfigurationError(format!(
                "DB_POOL_MIN ({pool_min}) cannot exceed DB_POOL_MAX ({pool_max})"
            )));
        }

        let database = DatabaseConfig {
            host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("DB_PORT", 5432)?,
            name: env::var("DB_NAME").unwrap_or_else(|_| "spiral_core".to_string()),
            user: env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("DB_PASSWORD").unwrap_or_default(),
            pool_min,
            pool_max,
        };

        let embedding_provider = match env::var("EMBEDDING_PROVIDER")
            .unwrap_or_else(|_| "remote".to_string())
            .as_str()
        {
            "remote" => EmbeddingProviderKind::Remote,
            "local" => EmbeddingProviderKind::Local,
            other => {
                return Err(SpiralError::ConfigurationError(format!(
                    "EMBEDDING_PROVIDER must be 'remote' or 'local', got '{other}'"
                )))
            }
        };

        let rag = RagConfig {
            enabled: env_parse_bool("RAG_ENABLED", true)?,
            embedding_provider,
            embedding_dimension: env_parse("EMBEDDING_DIMENSION", 1536)?,
            embedding_base_url: env::var("EMBEDDING_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            embedding_api_key: env::var("EMBEDDING_API_KEY").ok().filter(|s| !s.is_empty()),
            chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
            chat_base_url: env::var("CHAT_BASE_URL").unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string()),
            chat_api_key: env::var("CHAT_API_KEY").ok().filter(|s| !s.is_empty()),
            interval_seconds: env_parse("RAG_INTERVAL_SECONDS", 300)?,
            max_results: env_parse("RAG_MAX_RESULTS", 10)?,
            index_roots: env::var("RAG_INDEX_ROOTS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };
        if rag.max_results > crate::constants::RAG_MAX_TOP_K {
            return Err(SpiralError::ConfigurationError(format!(
                "RAG_MAX_RESULTS ({}) exceeds the hard ceiling of {}",
                rag.max_results,
                crate::constants::RAG_MAX_TOP_K
            )));
        }

        let agents = AgentsConfig {
            max_workers: env_parse("MAX_WORKERS", crate::constants::MAX_AGENTS)?,
            timeout_seconds: env_parse("AGENT_TIMEOUT_SECONDS", 3600)?,
        };

        let sanitize_mode = match env::var("SECURITY_SANITIZE_MODE")
            .unwrap_or_else(|_| "neutralize".to_string())
            .as_str()
        {
            "remove" => SanitizeMode::Remove,
            "neutralize" => SanitizeMode::Neutralize,
            "block" => SanitizeMode::Block,
            other => {
                return Err(SpiralError::ConfigurationError(format!(
                    "SECURITY_SANITIZE_MODE must be 'remove', 'neutralize', or 'block', got '{other}'"
                )))
            }
        };

        let alert_webhook = env::var("SECURITY_ALERT_WEBHOOK").ok().filter(|s| !s.is_empty());
        if let Some(url) = &alert_webhook {
            url::Url::parse(url).map_err(|e| {
                SpiralError::ConfigurationError(format!("SECURITY_ALERT_WEBHOOK is not a valid URL: {e}"))
            })?;
        }

        let security = SecurityConfig {
            enabled: env_parse_bool("SECURITY_ENABLED", true)?,
            sanitize_mode,
            alert_webhook,
        };

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Config {
            api,
            database,
            rag,
            agents,
            security,
            log_level,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| SpiralError::ConfigurationError(format!("{key} is not a valid value: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn env_parse_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(SpiralError::ConfigurationError(format!(
                "{key} must be a boolean, got '{other}'"
            ))),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "API_HOST", "API_PORT", "ALLOWED_ORIGINS", "DB_HOST", "DB_PORT", "DB_NAME", "DB_USER",
            "DB_PASSWORD", "DB_POOL_MIN", "DB_POOL_MAX", "EMBEDDING_PROVIDER", "EMBEDDING_DIMENSION",
            "CHAT_MODEL", "CHAT_BASE_URL", "CHAT_API_KEY", "EMBEDDING_BASE_URL", "EMBEDDING_API_KEY",
            "RAG_ENABLED", "RAG_INTERVAL_SECONDS", "RAG_MAX_RESULTS", "MAX_WORKERS",
            "AGENT_TIMEOUT_SECONDS", "SECURITY_ENABLED", "SECURITY_SANITIZE_MODE",
            "SECURITY_ALERT_WEBHOOK", "LOG_LEVEL",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn loads_with_defaults_when_unset() {
        clear_env();
        let config = Config::load().expect("defaults alone should be valid");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.rag.embedding_dimension, 1536);
    }

    #[test]
    #[serial]
    fn rejects_pool_min_above_max() {
        clear_env();
        env::set_var("DB_POOL_MIN", "20");
        env::set_var("DB_POOL_MAX", "5");
        let err = Config::load().unwrap_err();
        assert!(matches!(err, SpiralError::ConfigurationError(_)));
        clear_env();
    }

    #[test]
    #[serial]
    fn rejects_invalid_sanitize_mode() {
        clear_env();
        env::set_var("SECURITY_SANITIZE_MODE", "delete");
        let err = Config::load().unwrap_err();
        assert!(matches!(err, SpiralError::ConfigurationError(_)));
        clear_env();
    }
}
