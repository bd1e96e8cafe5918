mod assistant;
mod auth;
mod config;
mod handlers;
mod models;
mod openai;
mod store;
#[cfg(test)]
mod test_support;
mod tools;

use anyhow::{Context, Result};
use assistant::AssistantAgent;
use config::Config;
use handlers::{build_router, AppState, StatusInfo};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration
    let config = Config::load("config.toml")?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();
    log::info!("Starting notes assistant...");

    config.validate()?;
    log::info!("Configuration loaded successfully");

    let agent = AssistantAgent::new(&config);
    let state = AppState::new(agent, StatusInfo::from_config(&config));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Print startup info
    println!("📝 Notes assistant is running!");
    println!("   Listening on http://{}", addr);
    println!("   Model: {}", config.ai_model.model);
    println!("   Press Ctrl+C to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    log::info!("Notes assistant stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
}
