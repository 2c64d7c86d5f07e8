//! ATP gateway - Binary entry point
//!
//! Runs the gateway against the paper venue, prints every outbound event as
//! JSON and drives the poll scheduler from a timer until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

use atp_gateway::core::LogLevel;
use atp_gateway::paper::PaperVenue;
use atp_gateway::{AtpGateway, Config, ConnectSetting, EventPayload, runtime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atp_gateway=debug"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = if path.exists() {
        Config::load(&path)?
    } else {
        tracing::warn!("{} not found, using defaults", path.display());
        Config::default()
    }
    .with_env_credentials();
    config.validate()?;

    tracing::info!("ATP gateway starting ({})", config.gateway.name);
    runtime::init(&config.runtime)?;

    let venue = PaperVenue::start(&config.paper)?;
    let (tx, rx) = flume::unbounded();
    let gateway = AtpGateway::new(
        config.gateway.name.clone(),
        Arc::new(venue.trading_api()),
        Arc::new(venue.market_data_api()),
        config.poll.interval_ticks,
        tx,
    )?;

    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv_async().await {
            match (&event.payload, event.to_json()) {
                (EventPayload::Log(log), _) if log.level == LogLevel::Debug => {}
                (_, Ok(json)) => println!("{json}"),
                (_, Err(e)) => tracing::error!("Failed to encode event: {}", e),
            }
        }
    });

    gateway.connect(&ConnectSetting::from_config(&config.connection)?)?;
    for req in config.subscription_requests() {
        gateway.subscribe(req)?;
    }

    let mut timer = tokio::time::interval(Duration::from_millis(config.poll.timer_interval_ms));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                gateway.process_timer_tick();
            }
            result = &mut shutdown => {
                result?;
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    gateway.close();
    drop(gateway);
    tokio::task::spawn_blocking(move || venue.join()).await?;
    printer.await?;
    runtime::teardown();

    Ok(())
}
