//! In-process accessory host.

use super::cache::{AccessoryCache, CacheEntry};
use super::{AccessoryHost, PlatformPlugin};
use crate::accessory::{AccessoryHandle, ChangeNotifier, CharacteristicChange, ServiceKind};
use crate::error::{BridgeError, Result};
use crate::identity::IdentityToken;
use log::{debug, info};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct Registered {
    plugin: String,
    platform: String,
    accessory: AccessoryHandle,
}

/// Host that keeps registered accessories in memory and, optionally,
/// persists them to a JSON cache file.
pub struct LocalHost {
    cache_path: Option<PathBuf>,
    registered: RwLock<Vec<Registered>>,
    dirty: Arc<AtomicBool>,
    launched: AtomicBool,
}

impl LocalHost {
    /// Host backed by the cache file at `cache_path`.
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: Some(cache_path.into()),
            registered: RwLock::new(Vec::new()),
            dirty: Arc::new(AtomicBool::new(false)),
            launched: AtomicBool::new(false),
        }
    }

    /// Host without persistence.
    pub fn in_memory() -> Self {
        Self {
            cache_path: None,
            registered: RwLock::new(Vec::new()),
            dirty: Arc::new(AtomicBool::new(false)),
            launched: AtomicBool::new(false),
        }
    }

    /// Seed the host with previously cached accessories, as if they had been
    /// loaded from disk. Only valid before launch.
    pub fn seed(&self, entries: Vec<CacheEntry>) {
        let mut registered = self.registered.write();
        for entry in entries {
            let accessory = AccessoryHandle::from_snapshot(entry.accessory);
            self.watch(&accessory);
            registered.push(Registered {
                plugin: entry.plugin,
                platform: entry.platform,
                accessory,
            });
        }
    }

    /// Restore the cache, replay it into `plugin`, then signal that launch
    /// finished. Runs once; later calls are no-ops.
    pub fn launch(&self, plugin: &dyn PlatformPlugin) -> Result<()> {
        if self.launched.swap(true, Ordering::SeqCst) {
            debug!("[Host] Already launched");
            return Ok(());
        }

        if let Some(path) = &self.cache_path {
            self.seed(AccessoryCache::load(path).accessories);
        }

        for accessory in self.accessories() {
            plugin.configure_accessory(accessory);
        }

        info!("[Host] Finished launching");
        plugin.did_finish_launching()
    }

    /// Every accessory currently registered.
    pub fn accessories(&self) -> Vec<AccessoryHandle> {
        self.registered
            .read()
            .iter()
            .map(|r| r.accessory.clone())
            .collect()
    }

    pub fn is_registered(&self, identity: IdentityToken) -> bool {
        self.registered
            .read()
            .iter()
            .any(|r| r.accessory.identity() == identity)
    }

    /// True if registrations or characteristic values changed since the
    /// last [`persist`](Self::persist).
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Current state in cache form.
    pub fn snapshot(&self) -> AccessoryCache {
        AccessoryCache {
            accessories: self
                .registered
                .read()
                .iter()
                .map(|r| CacheEntry {
                    plugin: r.plugin.clone(),
                    platform: r.platform.clone(),
                    accessory: r.accessory.snapshot(),
                })
                .collect(),
        }
    }

    /// Write the cache file. No-op for in-memory hosts.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        self.dirty.store(false, Ordering::SeqCst);
        self.snapshot().save(path)?;
        Ok(())
    }

    /// Log value changes and mark the cache dirty.
    fn watch(&self, accessory: &AccessoryHandle) {
        let dirty = self.dirty.clone();
        accessory.set_notifier(ChangeNotifier::new(move |change: &CharacteristicChange| {
            // Skip the information service; it is rewritten on every start.
            if change.service != ServiceKind::AccessoryInformation {
                debug!(
                    "[Host] {} {}.{} = {}",
                    change.accessory, change.service, change.characteristic, change.value
                );
            }
            dirty.store(true, Ordering::SeqCst);
        }));
    }
}

impl AccessoryHost for LocalHost {
    fn create_accessory(&self, display_name: &str, identity: IdentityToken) -> AccessoryHandle {
        let accessory = AccessoryHandle::new(display_name, identity);
        // Hosts give every accessory an information service up front.
        accessory.ensure_service(ServiceKind::AccessoryInformation);
        accessory
    }

    fn register_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: Vec<AccessoryHandle>,
    ) -> Result<()> {
        let mut registered = self.registered.write();

        // Validate the whole batch before registering any of it.
        for (i, accessory) in accessories.iter().enumerate() {
            let identity = accessory.identity();
            let in_batch = accessories[..i].iter().any(|a| a.identity() == identity);
            let known = registered.iter().any(|r| r.accessory.identity() == identity);
            if in_batch || known {
                return Err(BridgeError::DuplicateIdentity(identity));
            }
        }

        for accessory in accessories {
            info!(
                "[Host] Registered {} ({}) for {}/{}",
                accessory.display_name(),
                accessory.identity(),
                plugin,
                platform
            );
            self.watch(&accessory);
            registered.push(Registered {
                plugin: plugin.to_string(),
                platform: platform.to_string(),
                accessory,
            });
        }
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn unregister_accessories(
        &self,
        plugin: &str,
        platform: &str,
        accessories: Vec<AccessoryHandle>,
    ) -> Result<()> {
        let mut registered = self.registered.write();
        for accessory in accessories {
            let identity = accessory.identity();
            let before = registered.len();
            registered.retain(|r| {
                !(r.accessory.identity() == identity && r.plugin == plugin && r.platform == platform)
            });
            if registered.len() == before {
                return Err(BridgeError::UnknownAccessory(identity));
            }
            info!(
                "[Host] Unregistered {} ({})",
                accessory.display_name(),
                identity
            );
        }
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessory::{CharacteristicKind, DeviceDescriptor};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPlugin {
        configured: Mutex<Vec<IdentityToken>>,
        launched: Mutex<u32>,
    }

    impl PlatformPlugin for RecordingPlugin {
        fn configure_accessory(&self, accessory: AccessoryHandle) {
            // Launch must not fire before every cached accessory is delivered.
            assert_eq!(*self.launched.lock(), 0);
            self.configured.lock().push(accessory.identity());
        }

        fn did_finish_launching(&self) -> Result<()> {
            *self.launched.lock() += 1;
            Ok(())
        }
    }

    #[test]
    fn test_create_has_information_service() {
        let host = LocalHost::in_memory();
        let acc = host.create_accessory("A", IdentityToken::generate("a"));
        assert_eq!(acc.service_count(ServiceKind::AccessoryInformation), 1);
        assert!(!host.is_registered(acc.identity()));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let host = LocalHost::in_memory();
        let identity = host.generate_identity("a");
        host.register_accessories("p", "q", vec![host.create_accessory("A", identity)])
            .unwrap();

        let err = host
            .register_accessories("p", "q", vec![host.create_accessory("A", identity)])
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateIdentity(id) if id == identity));
        assert_eq!(host.accessories().len(), 1);
    }

    #[test]
    fn test_duplicate_within_batch_registers_nothing() {
        let host = LocalHost::in_memory();
        let identity = host.generate_identity("a");
        let err = host
            .register_accessories(
                "p",
                "q",
                vec![
                    host.create_accessory("A", identity),
                    host.create_accessory("A2", identity),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateIdentity(_)));
        assert!(host.accessories().is_empty());
    }

    #[test]
    fn test_unregister_unknown_is_error() {
        let host = LocalHost::in_memory();
        let acc = host.create_accessory("A", host.generate_identity("a"));
        assert!(matches!(
            host.unregister_accessories("p", "q", vec![acc]),
            Err(BridgeError::UnknownAccessory(_))
        ));
    }

    #[test]
    fn test_launch_replays_cache_then_signals_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accessories.json");

        // First run: register one accessory and persist.
        let first = LocalHost::new(&path);
        let acc = first.create_accessory("A", first.generate_identity("a"));
        acc.set_device_context(DeviceDescriptor::new("a", "A"));
        first.register_accessories("p", "q", vec![acc.clone()]).unwrap();
        first.persist().unwrap();

        // Second run: the accessory is replayed before launch completes.
        let second = LocalHost::new(&path);
        let plugin = RecordingPlugin::default();
        second.launch(&plugin).unwrap();
        second.launch(&plugin).unwrap();

        assert_eq!(*plugin.configured.lock(), vec![acc.identity()]);
        assert_eq!(*plugin.launched.lock(), 1);
        assert!(second.is_registered(acc.identity()));
    }

    #[test]
    fn test_value_change_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalHost::new(dir.path().join("accessories.json"));
        let acc = host.create_accessory("A", host.generate_identity("a"));
        host.register_accessories("p", "q", vec![acc.clone()]).unwrap();
        host.persist().unwrap();
        assert!(!host.is_dirty());

        acc.ensure_service(ServiceKind::TemperatureSensor)
            .set_characteristic(CharacteristicKind::CurrentTemperature, 19.0);
        assert!(host.is_dirty());
    }

    #[test]
    fn test_in_memory_persist_is_noop() {
        let host = LocalHost::in_memory();
        assert!(host.persist().is_ok());
    }
}
