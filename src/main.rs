use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use jike_roast::{
    config::Config,
    api::routes::create_router,
    service::spawn_cache_sweeper,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::load()?;
    let server_addr = config.server_addr;
    info!(
        models = ?config.models,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        model_timeout = ?config.model_timeout,
        "configuration loaded"
    );

    // Create application state
    let app_state = AppState::from_config(config);

    if let Some(every) = app_state.config.cache_sweep_interval {
        info!(every_secs = every.as_secs(), "starting cache sweeper");
        spawn_cache_sweeper(Arc::clone(app_state.service.cache()), every);
    }

    // Build the router with routes
    let app = create_router(app_state);

    // Create the listener
    let listener = TcpListener::bind(server_addr).await?;

    // Start the server
    info!("Listening on {}", server_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down gracefully");
        })
        .await?;

    Ok(())
}
