use log::{error, info, warn};
use sensor_accessory_bridge::config::{self, Config};
use sensor_accessory_bridge::{AccessoryRegistry, LocalHost};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

/// How often the accessory cache is flushed when values changed.
const PERSIST_INTERVAL: Duration = Duration::from_secs(60);

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    // The env is only mutated here, before the runtime starts its workers.
    config::load_dotenv();
    init_logger();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run());
}

async fn run() {
    info!("Starting sensor accessory bridge");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("[Config] {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration loaded:");
    info!("  API URL: {}", config.api_url);
    info!("  Layout: {}", config.layout);
    info!("  Devices: {}", config.devices.len());
    info!("  Accessory cache: {:?}", config.cache_path);

    let host = Arc::new(LocalHost::new(&config.cache_path));
    let registry = match AccessoryRegistry::new(host.clone(), &config) {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to create accessory registry: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = host.launch(&registry) {
        error!("Failed to launch platform: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = host.persist() {
        warn!("[Host] Failed to save accessory cache: {}", e);
    }

    info!("Sensor accessory bridge is running");
    for accessory in registry.live_accessories() {
        info!("  - {} ({})", accessory.display_name(), accessory.identity());
    }
    info!("  - Press Ctrl+C to exit");

    let persist_host = host.clone();
    let persist_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PERSIST_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            if persist_host.is_dirty() {
                if let Err(e) = persist_host.persist() {
                    warn!("[Host] Failed to save accessory cache: {}", e);
                }
            }
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    persist_task.abort();
    for (name, stats) in registry.poll_stats() {
        info!(
            "[Bridge] {}: {} polls, {} ok, {} failed, {} skipped",
            name, stats.requests, stats.successes, stats.failures, stats.skipped
        );
    }
    registry.shutdown().await;

    if let Err(e) = host.persist() {
        warn!("[Host] Failed to save accessory cache: {}", e);
    }

    info!("Sensor accessory bridge stopped");
}
