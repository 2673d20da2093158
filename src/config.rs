use serde::Deserialize;
use validator::Validate;

/// Main configuration for the chatflow server
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Database URL (SeaORM / SQLite)
    pub database_url: String,

    /// API key for the Gemini provider
    pub gemini_api_key: String,

    /// API key for the Groq provider
    pub groq_api_key: String,

    /// Gemini API base URL
    pub gemini_base_url: String,

    /// Groq (OpenAI-compatible) API base URL
    pub groq_base_url: String,

    /// Model used to name new chats
    pub naming_model: String,

    /// Base URL used when building share links
    pub public_base_url: String,

    /// Maximum database connections
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,

    /// Generation requests allowed per window per user.
    /// If `None`, defaults to 4.
    pub rate_limit_requests: Option<u32>,

    /// Rate limit window in seconds. If `None`, defaults to 5.
    pub rate_limit_window_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            // Core defaults
            .set_default("server_port", 8080)?
            .set_default("max_connections", 10)?
            .set_default("log_level", "info")?
            .set_default("database_url", "sqlite://chatflow.db")?
            .set_default("gemini_api_key", "")?
            .set_default("groq_api_key", "")?
            .set_default(
                "gemini_base_url",
                "https://generativelanguage.googleapis.com",
            )?
            .set_default("groq_base_url", "https://api.groq.com/openai/v1")?
            .set_default("naming_model", "llama3-70b-8192")?
            .set_default("public_base_url", "http://localhost:8080")?
            .set_default("rate_limit_requests", 4u32)?
            .set_default("rate_limit_window_secs", 5u64)?
            // Load from ~/.chatflow/config.toml (if present)
            .add_source(
                config::File::with_name(&format!(
                    "{}/.chatflow/config",
                    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
                ))
                .required(false),
            )
            // Environment overrides: CHATFLOW__SERVER_PORT, CHATFLOW__GROQ_API_KEY, etc.
            .add_source(config::Environment::with_prefix("CHATFLOW").separator("__"))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Effective generation rate limit. Defaults to 4 requests per window.
    pub fn effective_rate_limit(&self) -> u32 {
        self.rate_limit_requests.unwrap_or(4)
    }

    /// Effective rate limit window. Defaults to 5 seconds.
    pub fn effective_rate_window_secs(&self) -> u64 {
        self.rate_limit_window_secs.unwrap_or(5)
    }
}
