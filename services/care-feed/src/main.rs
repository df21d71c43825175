use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use care_feed::api::{self, ApiState};
use care_feed::config;
use care_feed::health::HealthChecker;
use care_feed::notice::TracingNoticeSink;
use care_feed::runtime::CareFeeds;

#[derive(Parser, Debug)]
#[command(name = "care-feed")]
#[command(about = "Live appointment and notification feeds for the medical staff dashboard")]
struct Args {
    #[arg(short, long, default_value = "config/care-feed.yaml")]
    config: String,

    /// Overrides `api.port` from the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Run against the in-memory backend with generated sample data.
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load_config(&args.config)?;

    // Initialize tracing; RUST_LOG wins over observability.log_level
    let level = &config.observability.log_level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("care_feed={level},svckit={level},tower_http=debug").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = args.port.unwrap_or(config.api.port);
    info!(
        "Starting care-feed on port {} (driver={}, demo={})",
        port, config.backend.driver, args.demo
    );

    let feeds = Arc::new(CareFeeds::start(&config, args.demo, Arc::new(TracingNoticeSink)).await?);

    // Start filter reload task
    let reload_feeds = feeds.clone();
    let config_path = args.config.clone();
    let reload_every = Duration::from_secs(config.feeds.filter.reload_interval_secs.max(1));
    let reload_task = tokio::spawn(async move {
        filter_reload_loop(reload_feeds, config_path, reload_every).await;
    });

    let state = Arc::new(ApiState {
        health: HealthChecker::new(feeds.service()),
        feeds: feeds.clone(),
        metrics_enabled: config.observability.metrics_enabled,
    });

    api::start_server(state, port, shutdown_signal()).await?;

    reload_task.abort();
    feeds.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

// Hot-reload the notification filter from the config file
async fn filter_reload_loop(feeds: Arc<CareFeeds>, config_path: String, every: Duration) {
    loop {
        tokio::time::sleep(every).await;

        match config::load_config(&config_path) {
            Ok(new_config) => feeds.reload_filter(&new_config).await,
            Err(e) => {
                warn!("Failed to reload filter config: {}", e);
            }
        }
    }
}
