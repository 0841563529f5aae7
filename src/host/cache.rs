//! On-disk accessory cache for [`LocalHost`](super::LocalHost).
//!
//! A missing file means first run. An unreadable or corrupt file is logged
//! and treated as empty so the bridge still starts; the accessories are then
//! re-created under the same identities.

use crate::accessory::CachedAccessory;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One cached accessory with the plugin/platform that registered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub plugin: String,
    pub platform: String,
    #[serde(flatten)]
    pub accessory: CachedAccessory,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessoryCache {
    pub accessories: Vec<CacheEntry>,
}

impl AccessoryCache {
    /// Load from file
    pub fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<AccessoryCache>(&bytes) {
                Ok(cache) => {
                    info!(
                        "[Host] Loaded {} cached accessories from {:?}",
                        cache.accessories.len(),
                        path
                    );
                    cache
                }
                Err(e) => {
                    warn!("[Host] Failed to parse accessory cache {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[Host] No accessory cache found (first run)");
                Self::default()
            }
            Err(e) => {
                error!("[Host] Failed to read accessory cache {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save to file, writing through a temporary so a crash never leaves a
    /// truncated cache behind.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        let tmp = tmp_path(path);
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        info!(
            "[Host] Saved {} accessories to {:?}",
            self.accessories.len(),
            path
        );
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
