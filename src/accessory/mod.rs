//! Accessory data model.
//!
//! An accessory is the host's persisted representation of one physical
//! device. It carries a display name, a stable identity, a context bag and
//! a list of services, each holding characteristic value slots.
//!
//! [`AccessoryHandle`] is a cheap-clone shared reference: the host, the
//! registry and the sensor bridge all hold clones of the same accessory.

pub mod characteristic;
pub mod context;
pub mod service;

pub use characteristic::{
    ChangeNotifier, Characteristic, CharacteristicChange, CharacteristicKind, CharacteristicValue,
};
pub use context::{CONTEXT_VERSION, DeviceContext, DeviceDescriptor};
pub use service::{Service, ServiceKind};

use crate::error::Result;
use crate::identity::IdentityToken;
use characteristic::SharedNotifier;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

struct AccessoryInner {
    display_name: String,
    identity: IdentityToken,
    context: RwLock<serde_json::Value>,
    services: RwLock<Vec<Arc<Service>>>,
    notifier: SharedNotifier,
}

/// Shared reference to one accessory record.
#[derive(Clone)]
pub struct AccessoryHandle {
    inner: Arc<AccessoryInner>,
}

impl AccessoryHandle {
    /// Create a bare accessory with no services and an empty context.
    pub fn new(display_name: impl Into<String>, identity: IdentityToken) -> Self {
        Self {
            inner: Arc::new(AccessoryInner {
                display_name: display_name.into(),
                identity,
                context: RwLock::new(serde_json::Value::Null),
                services: RwLock::new(Vec::new()),
                notifier: SharedNotifier::default(),
            }),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    pub fn identity(&self) -> IdentityToken {
        self.inner.identity
    }

    /// True if both handles refer to the same accessory object.
    pub fn ptr_eq(&self, other: &AccessoryHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// First service of the given kind.
    pub fn service(&self, kind: ServiceKind) -> Option<Arc<Service>> {
        self.inner
            .services
            .read()
            .iter()
            .find(|s| s.kind() == kind)
            .cloned()
    }

    /// Return the service of the given kind, adding it if missing.
    ///
    /// Never creates a second service of a kind that already exists.
    pub fn ensure_service(&self, kind: ServiceKind) -> Arc<Service> {
        let mut services = self.inner.services.write();
        if let Some(existing) = services.iter().find(|s| s.kind() == kind) {
            return existing.clone();
        }
        let created = Arc::new(Service::new(
            kind,
            self.inner.identity,
            self.inner.notifier.clone(),
        ));
        services.push(created.clone());
        created
    }

    pub fn services(&self) -> Vec<Arc<Service>> {
        self.inner.services.read().clone()
    }

    /// Number of services of the given kind.
    pub fn service_count(&self, kind: ServiceKind) -> usize {
        self.inner
            .services
            .read()
            .iter()
            .filter(|s| s.kind() == kind)
            .count()
    }

    /// Raw context bag, as persisted by the host.
    pub fn context_value(&self) -> serde_json::Value {
        self.inner.context.read().clone()
    }

    pub fn set_context_value(&self, value: serde_json::Value) {
        *self.inner.context.write() = value;
    }

    /// Decode and validate the typed context.
    pub fn device_context(&self) -> Result<DeviceContext> {
        DeviceContext::from_value(&self.inner.context.read())
    }

    /// Store a descriptor as the current-version context.
    pub fn set_device_context(&self, device: DeviceDescriptor) {
        self.set_context_value(DeviceContext::new(device).to_value());
    }

    /// Install the host's change notifier for every characteristic, present
    /// and future.
    pub fn set_notifier(&self, notifier: ChangeNotifier) {
        *self.inner.notifier.write() = Some(notifier);
    }

    /// Serializable copy of the accessory for the host cache.
    pub fn snapshot(&self) -> CachedAccessory {
        CachedAccessory {
            display_name: self.inner.display_name.clone(),
            identity: self.inner.identity,
            context: self.context_value(),
            services: self
                .services()
                .iter()
                .map(|service| CachedService {
                    kind: service.kind(),
                    characteristics: service
                        .characteristics()
                        .iter()
                        .filter_map(|c| {
                            c.value().map(|value| CachedCharacteristic {
                                kind: c.kind(),
                                value,
                            })
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Rebuild an accessory from its cached form.
    pub fn from_snapshot(cached: CachedAccessory) -> Self {
        let handle = Self::new(cached.display_name, cached.identity);
        handle.set_context_value(cached.context);
        {
            let mut services = handle.inner.services.write();
            for cached_service in cached.services {
                let service = Arc::new(Service::new(
                    cached_service.kind,
                    handle.inner.identity,
                    handle.inner.notifier.clone(),
                ));
                for c in cached_service.characteristics {
                    service.characteristic(c.kind).restore(c.value);
                }
                services.push(service);
            }
        }
        handle
    }
}

impl fmt::Debug for AccessoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessoryHandle")
            .field("display_name", &self.inner.display_name)
            .field("identity", &self.inner.identity)
            .finish()
    }
}

/// Cached form of an accessory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedAccessory {
    pub display_name: String,
    pub identity: IdentityToken,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub services: Vec<CachedService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedService {
    pub kind: ServiceKind,
    #[serde(default)]
    pub characteristics: Vec<CachedCharacteristic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCharacteristic {
    pub kind: CharacteristicKind,
    pub value: CharacteristicValue,
}
