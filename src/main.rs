pub mod aggregator;
pub mod config;
pub mod sink;
pub mod transport;

use crate::aggregator::worker::AggregatorHandle;
use crate::sink::build_sink;
use crate::transport::mqtt_client::TransportHandle;
use color_eyre::{eyre::eyre, Result};
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    config::ensure_default_config().await?;
    let config = config::load_config().await?;
    info!(
        "Loaded configuration: broker {}:{}, topic '{}'",
        config.broker.host, config.broker.port, config.broker.topic
    );

    let (event_tx, event_rx) = mpsc::channel(1000);

    let transport = TransportHandle::spawn(config.broker.clone(), event_tx)
        .map_err(|e| eyre!("Failed to spawn transport: {}", e))?;

    let sink = build_sink(&config.sink);
    let aggregator = AggregatorHandle::spawn(config.aggregator.clone(), event_rx, sink);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, draining active records");

    // Stopping the transport drops its event sender; the aggregator
    // drains the remaining records and exits.
    transport.shutdown();
    aggregator.join().await;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
