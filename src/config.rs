use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub openrouter_api_key: String,
    pub llm_base_url: String,
    pub site_url: Option<String>,
    pub site_name: Option<String>,
    pub models: Vec<String>,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub cache_sweep_interval: Option<Duration>,
    /// Unset means a model call may take as long as the backend does.
    pub model_timeout: Option<Duration>,
    pub max_concurrent_invocations: usize,
}

impl Config {
    /// Defaults for everything except the API key.
    pub fn new(openrouter_api_key: impl Into<String>) -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            openrouter_api_key: openrouter_api_key.into(),
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            site_url: None,
            site_name: None,
            models: vec![DEFAULT_MODEL.to_string()],
            cache_ttl: Duration::from_secs(3600),
            cache_max_entries: 1024,
            cache_sweep_interval: None,
            model_timeout: None,
            max_concurrent_invocations: 16,
        }
    }

    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any variable source, so parsing can be exercised
    /// without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openrouter_api_key = lookup("OPENROUTER_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("OPENROUTER_API_KEY is not set".to_string()))?;
        let mut config = Self::new(openrouter_api_key);

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("PORT").unwrap_or_else(|| "3000".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;
        config.server_addr = SocketAddr::new(ip, port);

        if let Some(base_url) = lookup("LLM_BASE_URL") {
            config.llm_base_url = base_url.trim_end_matches('/').to_string();
        }

        config.site_url = lookup("OPENROUTER_SITE_URL").filter(|v| !v.is_empty());
        config.site_name = lookup("OPENROUTER_SITE_NAME").filter(|v| !v.is_empty());

        if let Some(models) = lookup("ROAST_MODELS") {
            config.models = parse_models(&models)?;
        }

        if let Some(ttl) = parse_secs(&lookup, "CACHE_TTL_SECS")? {
            config.cache_ttl = ttl;
        }
        if let Some(max_entries) = parse_positive(&lookup, "CACHE_MAX_ENTRIES")? {
            config.cache_max_entries = max_entries;
        }
        // 0 turns the sweeper off.
        config.cache_sweep_interval = parse_secs(&lookup, "CACHE_SWEEP_INTERVAL_SECS")?
            .filter(|every| !every.is_zero());
        config.model_timeout = parse_positive(&lookup, "MODEL_TIMEOUT_SECS")?
            .map(|secs| Duration::from_secs(secs as u64));
        if let Some(limit) = parse_positive(&lookup, "MAX_CONCURRENT_INVOCATIONS")? {
            config.max_concurrent_invocations = limit;
        }

        Ok(config)
    }
}

fn parse_models(raw: &str) -> Result<Vec<String>> {
    let mut models: Vec<String> = Vec::new();
    for model in raw.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        if !models.iter().any(|m| m == model) {
            models.push(model.to_string());
        }
    }

    if models.is_empty() {
        return Err(AppError::ConfigError("ROAST_MODELS must name at least one model".to_string()));
    }
    Ok(models)
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e)))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        None => Ok(None),
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(0) => Err(AppError::ConfigError(format!("{} must be at least 1", key))),
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(AppError::ConfigError(format!("Invalid {}: {}", key, e))),
        },
        None => Ok(None),
    }
}
