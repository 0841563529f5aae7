use crate::accessory::DeviceDescriptor;
use crate::error::{BridgeError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};

/// Plugin name used when registering accessories with the host.
pub const PLUGIN_NAME: &str = "sensor-accessory-bridge";

/// Platform name used when registering accessories with the host.
pub const PLATFORM_NAME: &str = "TphbSensors";

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: called before the async runtime starts any threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            Some((key.trim(), value))
        })
        .collect()
}

/// How a physical device's readings map onto accessories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SensorLayout {
    /// One accessory per device with temperature, humidity and light services.
    #[default]
    Combined,
    /// One accessory per reading type per device.
    Split,
}

/// One configured sensor device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorDeviceConfig {
    #[serde(flatten)]
    pub descriptor: DeviceDescriptor,
    /// Overrides the platform `api_url` for this device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl SensorDeviceConfig {
    pub fn new(sensor_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            descriptor: DeviceDescriptor::new(sensor_id, display_name),
            api_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the sensor endpoint, without the path.
    pub api_url: String,
    pub devices: Vec<SensorDeviceConfig>,
    pub layout: SensorLayout,
    /// Where the local host keeps its accessory cache.
    pub cache_path: PathBuf,
    /// Unregister cached accessories that no configured device claims.
    pub prune_stale: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            devices: vec![SensorDeviceConfig::new("tempe-sensor-id", "Temperature Sensor")],
            layout: SensorLayout::Combined,
            cache_path: default_cache_path(),
            prune_stale: false,
        }
    }
}

/// `<data dir>/sensor-accessory-bridge/accessories.json`
pub fn default_cache_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PLUGIN_NAME)
        .join("accessories.json")
}

impl Config {
    /// Build from the process environment. `PLATFORM_CONFIG` names an
    /// optional JSON file loaded first; individual variables override it.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("PLATFORM_CONFIG") {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(url) = lookup("API_URL") {
            config.api_url = url;
        }
        if let Some(devices) = lookup("SENSOR_DEVICES") {
            config.devices = serde_json::from_str(&devices)
                .map_err(|e| BridgeError::Config(format!("SENSOR_DEVICES: {}", e)))?;
        }
        if let Some(layout) = lookup("SENSOR_LAYOUT") {
            config.layout = layout
                .parse()
                .map_err(|_| BridgeError::Config(format!("unknown SENSOR_LAYOUT '{}'", layout)))?;
        }
        if let Some(path) = lookup("ACCESSORY_CACHE_PATH") {
            config.cache_path = PathBuf::from(path);
        }
        if let Some(prune) = lookup("PRUNE_STALE_ACCESSORIES") {
            match prune.parse() {
                Ok(p) => config.prune_stale = p,
                Err(_) => warn!("[Config] Ignoring PRUNE_STALE_ACCESSORIES='{}'", prune),
            }
        }

        if config.api_url.is_empty() {
            warn!("[Config] api_url is not set; every poll will fail");
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a JSON platform block, e.g.
    /// `{ "api_url": "http://10.0.0.5", "devices": [...], "layout": "split" }`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject device lists that would map two devices onto one identity.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            let id = &device.descriptor.sensor_id;
            if id.is_empty() {
                return Err(BridgeError::Config("device with empty sensorId".into()));
            }
            if !seen.insert(id.as_str()) {
                return Err(BridgeError::Config(format!("duplicate sensorId '{}'", id)));
            }
        }
        Ok(())
    }

    /// Endpoint base URL for a device.
    pub fn api_url_for<'a>(&'a self, device: &'a SensorDeviceConfig) -> &'a str {
        device.api_url.as_deref().unwrap_or(&self.api_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_have_single_device() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].descriptor.sensor_id, "tempe-sensor-id");
        assert_eq!(config.devices[0].descriptor.display_name, "Temperature Sensor");
        assert_eq!(config.layout, SensorLayout::Combined);
        assert!(!config.prune_stale);
        assert!(config.cache_path.ends_with("sensor-accessory-bridge/accessories.json"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("API_URL", "http://10.0.0.5:8080"),
            (
                "SENSOR_DEVICES",
                r#"[{"sensorId":"a","displayName":"Kitchen"},
                    {"sensorId":"b","displayName":"Garage","apiUrl":"http://10.0.0.6"}]"#,
            ),
            ("SENSOR_LAYOUT", "Split"),
            ("ACCESSORY_CACHE_PATH", "/tmp/cache.json"),
            ("PRUNE_STALE_ACCESSORIES", "true"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "http://10.0.0.5:8080");
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.layout, SensorLayout::Split);
        assert_eq!(config.cache_path, PathBuf::from("/tmp/cache.json"));
        assert!(config.prune_stale);
        assert_eq!(config.api_url_for(&config.devices[0]), "http://10.0.0.5:8080");
        assert_eq!(config.api_url_for(&config.devices[1]), "http://10.0.0.6");
    }

    #[test]
    fn test_invalid_bool_is_ignored() {
        let config =
            Config::from_lookup(lookup(&[("PRUNE_STALE_ACCESSORIES", "maybe")])).unwrap();
        assert!(!config.prune_stale);
    }

    #[test]
    fn test_bad_layout_is_error() {
        let err = Config::from_lookup(lookup(&[("SENSOR_LAYOUT", "grid")])).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_bad_devices_json_is_error() {
        let err = Config::from_lookup(lookup(&[("SENSOR_DEVICES", "[{")])).unwrap_err();
        assert!(err.to_string().contains("SENSOR_DEVICES"));
    }

    #[test]
    fn test_duplicate_sensor_ids_rejected() {
        let err = Config::from_json_str(
            r#"{"devices":[{"sensorId":"a","displayName":"A"},{"sensorId":"a","displayName":"B"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate sensorId 'a'"));
    }

    #[test]
    fn test_platform_block_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.json");
        fs::write(
            &path,
            r#"{ "platform": "TphbSensors", "api_url": "http://sensors.local", "layout": "split" }"#,
        )
        .unwrap();

        let config = Config::from_lookup(lookup(&[(
            "PLATFORM_CONFIG",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        assert_eq!(config.api_url, "http://sensors.local");
        assert_eq!(config.layout, SensorLayout::Split);
        // Unspecified fields keep their defaults.
        assert_eq!(config.devices.len(), 1);
    }

    #[test]
    fn test_parse_dotenv() {
        let parsed = parse_dotenv(
            "# comment\nAPI_URL = http://10.0.0.5\n\nSENSOR_LAYOUT=\"split\"\nNAME='Living Room'\nbroken line\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("API_URL", "http://10.0.0.5"),
                ("SENSOR_LAYOUT", "split"),
                ("NAME", "Living Room"),
            ]
        );
    }
}
