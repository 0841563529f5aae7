//! Accessory registry: reconciles cached accessories with configured devices.
//!
//! The host replays its cache through [`AccessoryRegistry::configure_accessory`]
//! and then signals [`AccessoryRegistry::on_restore_complete`]. Only then does
//! discovery run: every configured device is matched by identity against the
//! restored accessories, reused if found, otherwise created and registered
//! exactly once. Each resulting accessory gets one [`SensorBridge`].
//!
//! Discovery never runs before the restore signal; registering before the
//! cache is known would re-register cached identities, which the host
//! rejects as fatal.

use crate::accessory::{AccessoryHandle, DeviceDescriptor};
use crate::bridge::{HttpReadingSource, POLL_INTERVAL, PollStats, ReadingKind, ReadingSource, SensorBridge};
use crate::config::{Config, PLATFORM_NAME, PLUGIN_NAME, SensorLayout};
use crate::error::{BridgeError, Result};
use crate::host::{AccessoryHost, PlatformPlugin};
use crate::identity::IdentityToken;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use strum::IntoEnumIterator;

/// One accessory the configuration asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredAccessory {
    /// Stored as the accessory context; its `sensor_id` keys the identity.
    pub descriptor: DeviceDescriptor,
    /// Readings this accessory exposes.
    pub kinds: Vec<ReadingKind>,
    /// Base URL the accessory's bridge polls.
    pub api_url: String,
}

/// Expand the configured devices into accessories according to the layout.
pub fn desired_accessories(config: &Config) -> Vec<DesiredAccessory> {
    let mut desired = Vec::new();
    for device in &config.devices {
        let api_url = config.api_url_for(device).to_string();
        let descriptor = &device.descriptor;
        match config.layout {
            SensorLayout::Combined => desired.push(DesiredAccessory {
                descriptor: descriptor.clone(),
                kinds: ReadingKind::iter().collect(),
                api_url,
            }),
            SensorLayout::Split => {
                for kind in ReadingKind::iter() {
                    desired.push(DesiredAccessory {
                        descriptor: DeviceDescriptor::new(
                            format!("{}/{}", descriptor.sensor_id, kind),
                            format!("{} {}", descriptor.display_name, split_suffix(kind)),
                        ),
                        kinds: vec![kind],
                        api_url: api_url.clone(),
                    });
                }
            }
        }
    }
    desired
}

fn split_suffix(kind: ReadingKind) -> &'static str {
    match kind {
        ReadingKind::Temperature => "Temperature",
        ReadingKind::Humidity => "Humidity",
        ReadingKind::Brightness => "Light",
    }
}

/// Builds the reading source for a desired accessory.
pub type SourceFactory =
    Arc<dyn Fn(&DesiredAccessory) -> Result<Arc<dyn ReadingSource>> + Send + Sync>;

/// Factory for HTTP sources sharing one client and connection pool.
pub fn http_source_factory() -> Result<SourceFactory> {
    let client = reqwest::Client::builder().build()?;
    Ok(Arc::new(move |desired: &DesiredAccessory| -> Result<Arc<dyn ReadingSource>> {
        let source: Arc<dyn ReadingSource> =
            Arc::new(HttpReadingSource::with_client(client.clone(), &desired.api_url));
        Ok(source)
    }))
}

struct LiveAccessory {
    accessory: AccessoryHandle,
    bridge: SensorBridge,
}

pub struct AccessoryRegistry {
    host: Arc<dyn AccessoryHost>,
    desired: Vec<DesiredAccessory>,
    source_factory: SourceFactory,
    poll_interval: Duration,
    prune_stale: bool,
    /// Accessories restored from the host cache.
    accessories: RwLock<Vec<AccessoryHandle>>,
    /// One bridge per live accessory, keyed by identity.
    live: Mutex<HashMap<IdentityToken, LiveAccessory>>,
    restore_complete: AtomicBool,
}

impl AccessoryRegistry {
    /// Registry for the configured devices, polling over HTTP.
    pub fn new(host: Arc<dyn AccessoryHost>, config: &Config) -> Result<Self> {
        Ok(Self::with_source_factory(
            host,
            desired_accessories(config),
            http_source_factory()?,
        )
        .with_prune_stale(config.prune_stale))
    }

    pub fn with_source_factory(
        host: Arc<dyn AccessoryHost>,
        desired: Vec<DesiredAccessory>,
        source_factory: SourceFactory,
    ) -> Self {
        Self {
            host,
            desired,
            source_factory,
            poll_interval: POLL_INTERVAL,
            prune_stale: false,
            accessories: RwLock::new(Vec::new()),
            live: Mutex::new(HashMap::new()),
            restore_complete: AtomicBool::new(false),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_prune_stale(mut self, prune_stale: bool) -> Self {
        self.prune_stale = prune_stale;
        self
    }

    /// Record one accessory restored from the host cache. Only accepted
    /// during the restore phase.
    pub fn configure_accessory(&self, accessory: AccessoryHandle) {
        if self.restore_complete.load(Ordering::SeqCst) {
            warn!(
                "[Registry] Ignoring cached accessory {} delivered after restore completed",
                accessory.display_name()
            );
            return;
        }
        info!("[Registry] Loading accessory from cache: {}", accessory.display_name());
        self.accessories.write().push(accessory);
    }

    /// The host finished restoring its cache. Runs discovery; fires at most
    /// once.
    pub fn on_restore_complete(&self) -> Result<()> {
        if self.restore_complete.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::RestoreAlreadyComplete);
        }
        debug!("[Registry] Restore complete, discovering devices");
        self.discover_devices()
    }

    /// Reconcile configured devices against restored accessories and attach
    /// a bridge to each. Devices that already have a live bridge are left
    /// alone, so calling this again is harmless.
    pub fn discover_devices(&self) -> Result<()> {
        if !self.restore_complete.load(Ordering::SeqCst) {
            return Err(BridgeError::RestoreNotComplete);
        }

        for desired in &self.desired {
            let identity = self.host.generate_identity(&desired.descriptor.sensor_id);
            if self.live.lock().contains_key(&identity) {
                continue;
            }

            let restored = self
                .accessories
                .read()
                .iter()
                .find(|a| a.identity() == identity)
                .cloned();

            let live = match restored {
                Some(accessory) => self.restore(accessory, desired)?,
                None => self.add(identity, desired)?,
            };
            self.live.lock().insert(identity, live);
        }

        self.reconcile_stale()
    }

    fn restore(&self, accessory: AccessoryHandle, desired: &DesiredAccessory) -> Result<LiveAccessory> {
        info!(
            "[Registry] Restoring existing accessory from cache: {}",
            accessory.display_name()
        );

        match accessory.device_context() {
            Ok(context) if context.device == desired.descriptor => {}
            Ok(context) => {
                info!(
                    "[Registry] {}: device changed ({:?} -> {:?}), updating context",
                    accessory.display_name(),
                    context.device.display_name,
                    desired.descriptor.display_name
                );
                accessory.set_device_context(desired.descriptor.clone());
            }
            Err(e) => {
                warn!(
                    "[Registry] {}: cached context rejected ({}), rewriting",
                    accessory.display_name(),
                    e
                );
                accessory.set_device_context(desired.descriptor.clone());
            }
        }

        let bridge = self.attach(&accessory, desired)?;
        Ok(LiveAccessory { accessory, bridge })
    }

    fn add(&self, identity: IdentityToken, desired: &DesiredAccessory) -> Result<LiveAccessory> {
        info!("[Registry] Adding new accessory: {}", desired.descriptor.display_name);

        let accessory = self
            .host
            .create_accessory(&desired.descriptor.display_name, identity);
        accessory.set_device_context(desired.descriptor.clone());

        let bridge = self.attach(&accessory, desired)?;
        // On failure the bridge is dropped here, which stops its polling.
        self.host
            .register_accessories(PLUGIN_NAME, PLATFORM_NAME, vec![accessory.clone()])?;

        Ok(LiveAccessory { accessory, bridge })
    }

    fn attach(&self, accessory: &AccessoryHandle, desired: &DesiredAccessory) -> Result<SensorBridge> {
        let source = (self.source_factory)(desired)?;
        SensorBridge::attach_with_interval(
            accessory.clone(),
            &desired.kinds,
            source,
            self.poll_interval,
        )
    }

    /// Cached accessories no configured device claims.
    fn reconcile_stale(&self) -> Result<()> {
        let stale: Vec<AccessoryHandle> = {
            let live = self.live.lock();
            self.accessories
                .read()
                .iter()
                .filter(|a| !live.contains_key(&a.identity()))
                .cloned()
                .collect()
        };
        if stale.is_empty() {
            return Ok(());
        }

        for accessory in &stale {
            warn!(
                "[Registry] Cached accessory {} ({}) is not configured",
                accessory.display_name(),
                accessory.identity()
            );
        }

        if self.prune_stale {
            info!("[Registry] Removing {} stale accessories", stale.len());
            self.host
                .unregister_accessories(PLUGIN_NAME, PLATFORM_NAME, stale.clone())?;
            self.accessories
                .write()
                .retain(|a| !stale.iter().any(|s| s.identity() == a.identity()));
        }
        Ok(())
    }

    /// Stop an accessory's bridge and remove the accessory from the host.
    pub async fn remove_device(&self, identity: IdentityToken) -> Result<()> {
        let live = self
            .live
            .lock()
            .remove(&identity)
            .ok_or(BridgeError::UnknownAccessory(identity))?;

        info!("[Registry] Removing accessory {}", live.accessory.display_name());
        live.bridge.shutdown().await;
        self.accessories.write().retain(|a| a.identity() != identity);
        self.host
            .unregister_accessories(PLUGIN_NAME, PLATFORM_NAME, vec![live.accessory])
    }

    /// Stop every bridge. Accessories stay registered.
    pub async fn shutdown(&self) {
        let live: Vec<LiveAccessory> = self.live.lock().drain().map(|(_, l)| l).collect();
        for l in live {
            l.bridge.shutdown().await;
        }
    }

    pub fn is_restore_complete(&self) -> bool {
        self.restore_complete.load(Ordering::SeqCst)
    }

    /// Accessories restored from the cache.
    pub fn restored_accessories(&self) -> Vec<AccessoryHandle> {
        self.accessories.read().clone()
    }

    /// Accessories with a running bridge.
    pub fn live_accessories(&self) -> Vec<AccessoryHandle> {
        self.live
            .lock()
            .values()
            .map(|l| l.accessory.clone())
            .collect()
    }

    /// Polling counters per live accessory.
    pub fn poll_stats(&self) -> Vec<(String, PollStats)> {
        self.live
            .lock()
            .values()
            .map(|l| (l.accessory.display_name().to_string(), l.bridge.stats()))
            .collect()
    }
}

impl PlatformPlugin for AccessoryRegistry {
    fn configure_accessory(&self, accessory: AccessoryHandle) {
        AccessoryRegistry::configure_accessory(self, accessory);
    }

    fn did_finish_launching(&self) -> Result<()> {
        self.on_restore_complete()
    }
}
