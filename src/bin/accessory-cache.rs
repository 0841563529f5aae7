//! Inspection tool for the sensor accessory bridge.
//!
//! Usage:
//!   cargo run --bin accessory-cache -- list
//!   cargo run --bin accessory-cache -- identity <sensor-id>
//!   cargo run --bin accessory-cache -- probe --api-url http://10.0.0.5

use clap::{Parser, Subcommand};
use sensor_accessory_bridge::bridge::{HttpReadingSource, ReadingKind, ReadingSource};
use sensor_accessory_bridge::config::{self, SensorLayout, default_cache_path};
use sensor_accessory_bridge::host::AccessoryCache;
use sensor_accessory_bridge::{DeviceContext, IdentityToken};
use std::path::PathBuf;
use strum::IntoEnumIterator;

#[derive(Parser)]
#[command(name = "accessory-cache")]
#[command(about = "Inspect the sensor accessory bridge cache and endpoint")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List accessories stored in the cache file
    List {
        /// Cache file; defaults to the bridge's data directory
        #[arg(long, env = "ACCESSORY_CACHE_PATH")]
        cache: Option<PathBuf>,
    },
    /// Print the accessory identity generated for a sensor id
    Identity {
        sensor_id: String,

        /// Also print the identities of the split-layout accessories
        #[arg(long, default_value_t = SensorLayout::Combined)]
        layout: SensorLayout,
    },
    /// Fetch one reading from the sensor endpoint
    Probe {
        /// Base URL of the sensor endpoint
        #[arg(long, env = "API_URL")]
        api_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::load_dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::List { cache } => {
            let path = cache.unwrap_or_else(default_cache_path);
            let cache = AccessoryCache::load(&path);
            if cache.accessories.is_empty() {
                println!("No cached accessories in {}", path.display());
                return Ok(());
            }

            println!("{} cached accessories in {}:", cache.accessories.len(), path.display());
            for entry in &cache.accessories {
                let accessory = &entry.accessory;
                println!();
                println!("  {} [{}]", accessory.display_name, accessory.identity);
                println!("    registered by {}/{}", entry.plugin, entry.platform);
                match DeviceContext::from_value(&accessory.context) {
                    Ok(context) => println!(
                        "    device: {} (context v{})",
                        context.device.sensor_id, context.version
                    ),
                    Err(e) => println!("    device: <{}>", e),
                }
                for service in &accessory.services {
                    println!("    {}", service.kind);
                    for characteristic in &service.characteristics {
                        println!("      {} = {}", characteristic.kind, characteristic.value);
                    }
                }
            }
        }
        Commands::Identity { sensor_id, layout } => {
            println!("{}  {}", IdentityToken::generate(&sensor_id), sensor_id);
            if layout == SensorLayout::Split {
                for kind in ReadingKind::iter() {
                    let key = format!("{}/{}", sensor_id, kind);
                    println!("{}  {}", IdentityToken::generate(&key), key);
                }
            }
        }
        Commands::Probe { api_url } => {
            let source = HttpReadingSource::new(&api_url)?;
            println!("GET {}", source.describe());

            let reading = source.fetch().await?;
            println!("  temperature: {} °C", reading.temperature);
            println!("  humidity:    {} %", reading.humidity);
            println!("  brightness:  {} lx", reading.brightness);

            if let Err(e) = reading.validate() {
                eprintln!("Reading would be rejected by the bridge: {}", e);
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
