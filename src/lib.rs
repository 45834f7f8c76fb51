pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fan_out;
pub mod llm;
pub mod prompt;
pub mod scraper;
pub mod service;

use std::sync::Arc;

use crate::cache::ResultCache;
use crate::config::Config;
use crate::fan_out::FanOut;
use crate::llm::{ModelInvoker, OpenRouterBackend};
use crate::scraper::HttpPageSource;
use crate::service::RoastService;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<RoastService>,
}

impl AppState {
    /// Wires the production collaborators: HTTP page fetches and OpenRouter.
    pub fn from_config(config: Config) -> Self {
        let backend = OpenRouterBackend::new(&config.llm_base_url, &config.openrouter_api_key)
            .with_site(config.site_url.clone(), config.site_name.clone());
        let invoker = ModelInvoker::new(Arc::new(backend), config.model_timeout);
        let fan_out = FanOut::new(invoker, config.max_concurrent_invocations);
        let cache = Arc::new(ResultCache::new(config.cache_ttl, config.cache_max_entries));
        let service = RoastService::new(
            cache,
            Arc::new(HttpPageSource::new()),
            fan_out,
            config.models.clone(),
        );

        Self {
            config: Arc::new(config),
            service: Arc::new(service),
        }
    }
}
