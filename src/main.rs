mod config;
mod db;
mod dispatch;
mod error;
mod event;
mod handlers;
mod llm;
mod rate_limit;
mod routes;
mod services;
mod state;
mod telegram;
mod transport;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{BotConfig, ConfigError};
use crate::dispatch::Dispatcher;
use crate::llm::LlmChat;
use crate::routes::WebhookRoute;
use crate::services::advisor::LlmAdvisor;
use crate::state::{AppState, Stores};
use crate::telegram::TelegramClient;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
enum BootError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("telegram: {0}")]
    Telegram(#[from] TransportError),
    #[error("server: {0}")]
    Server(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "whatsfordinner failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BootError> {
    let config = BotConfig::from_env()?;
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;

    // Non-fatal: without an LLM every Advisor call fails with a friendly message.
    let llm: Option<Arc<dyn LlmChat>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            info!(model = client.model(), "LLM client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "LLM client not configured; AI features disabled");
            None
        }
    };
    let advisor = Arc::new(LlmAdvisor::new(llm, config.advisor));
    let telegram = Arc::new(TelegramClient::new(&config.telegram)?);
    let me = telegram.get_me().await?;
    info!(bot_id = me.id, username = me.username.as_deref().unwrap_or_default(), "telegram bot identified");
    let bot_username: Option<Arc<str>> = me.username.map(Arc::from);

    let state = AppState::new(
        Stores::postgres(pool),
        advisor,
        telegram.clone(),
        config.dinner.clone(),
        config.rate_limit,
    );
    let dispatcher = Dispatcher::new(state, config.workers);

    let webhook = match &config.telegram.webhook {
        Some(hook) => {
            telegram.set_webhook(&hook.url, &hook.secret).await?;
            info!(url = %hook.url, "webhook registered");
            Some(WebhookRoute::new(dispatcher.clone(), &hook.secret, bot_username))
        }
        None => {
            telegram.delete_webhook().await?;
            let poll_timeout = config.telegram.poll_timeout_secs;
            tokio::spawn(telegram::poller::run(telegram.clone(), dispatcher.clone(), bot_username, poll_timeout));
            None
        }
    };

    let app = routes::app(webhook);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!(port = config.port, "whatsfordinner listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; running until killed");
        std::future::pending::<()>().await;
    }
}
