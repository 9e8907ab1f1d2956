mod api;
mod config;
mod error;
mod homework;
mod notifier;
mod poller;
mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::PracticumClient;
use crate::config::{Config, Credentials};
use crate::notifier::TelegramNotifier;
use crate::poller::PollLoop;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,homework_watch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting homework status bot");

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("Failed to load .env file: {}", e);
        }
    }

    // An explicitly named config file must exist; the default one is optional.
    let (config_path, required) = match std::env::args().nth(1) {
        Some(path) => (PathBuf::from(path), true),
        None => (PathBuf::from("config.toml"), false),
    };

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path, required)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("fatal: {}. Bot stopped.", e);
            return Err(e.into());
        }
    };
    info!("Environment variables are available");

    info!("Configuration loaded successfully");
    info!("  Endpoint: {}", config.practicum.endpoint);
    info!("  Poll interval: {}s", config.poll.interval_secs);
    info!("  Verdicts: {}", config.verdicts.len());

    let api = PracticumClient::new(&config.practicum, &credentials.practicum_token)
        .context("Failed to build HTTP client")?;
    let notifier = TelegramNotifier::new(&credentials.telegram_token, &credentials.chat_id);

    let cursor = chrono::Utc::now().timestamp();
    let mut poll_loop = PollLoop::new(api, notifier, &config, cursor);

    poll_loop
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Bot stopped (cursor={})", poll_loop.cursor());
    Ok(())
}
