//! Sensor accessory bridge library.
//!
//! Exposes an HTTP environmental sensor (temperature, humidity, ambient
//! light) as smart-home accessories. The [`registry`] reconciles configured
//! devices with accessories the host restored from its cache, and each
//! accessory gets a [`bridge::SensorBridge`] that polls the sensor endpoint
//! and keeps the accessory's characteristics current.

pub mod accessory;
pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod registry;

pub use accessory::{AccessoryHandle, DeviceContext, DeviceDescriptor};
pub use bridge::{Reading, ReadingKind, SensorBridge};
pub use config::{Config, SensorLayout};
pub use error::{BridgeError, Result};
pub use host::{AccessoryHost, LocalHost, PlatformPlugin};
pub use identity::IdentityToken;
pub use registry::AccessoryRegistry;
