//! ServerWatch - game server status bot
//!
//! Polls Minecraft servers on a schedule and keeps one status message per
//! chat channel up to date, with an optional player-count chart.

mod chart;
mod config;
mod discord;
mod history;
mod presentation;
mod probe;
mod scheduler;
mod web;

use chart::PngChartRenderer;
use config::BotConfig;
use discord::DiscordClient;
use presentation::PresentationBuilder;
use probe::SlpProbe;
use scheduler::{Scheduler, TickContext};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("serverwatch=info".parse()?))
        .init();

    // Load configuration
    let config_path = config::config_path();
    let cfg = BotConfig::load()?;
    tracing::info!(
        "Starting ServerWatch with {} targets from {}",
        cfg.targets.len(),
        config_path.display()
    );

    // Authenticate before scheduling anything
    let client = DiscordClient::new(&cfg.bot)?;
    let me = client.current_user().await?;
    tracing::info!("Logged in as {} ({})", me.username, me.id);

    let builder = PresentationBuilder::new(cfg.presentation.clone(), Arc::new(PngChartRenderer));
    let ctx = TickContext::new(
        Arc::new(SlpProbe),
        Arc::new(client),
        builder,
        cfg.history.sample_interval(),
    );

    // Start scheduler
    let scheduler = Arc::new(Scheduler::new(ctx, cfg.targets));
    scheduler.start();

    // Serve the query API until Ctrl-C
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutting down");
    };

    if cfg.http.port == 0 {
        shutdown.await;
    } else {
        let server = Server::new(scheduler.clone(), config_path, cfg.http.port);
        server.start(shutdown).await?;
    }

    scheduler.stop();
    Ok(())
}
