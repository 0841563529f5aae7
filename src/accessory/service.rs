//! Services: typed groups of characteristics on an accessory.

use super::characteristic::{
    Characteristic, CharacteristicKind, CharacteristicValue, SharedNotifier,
};
use crate::identity::IdentityToken;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};

/// Service types used by this bridge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum ServiceKind {
    /// Manufacturer, model and serial metadata. Every accessory has one.
    AccessoryInformation,
    TemperatureSensor,
    HumiditySensor,
    LightSensor,
}

impl ServiceKind {
    /// The characteristic that carries this service's reading, if any.
    pub const fn primary_characteristic(&self) -> Option<CharacteristicKind> {
        match self {
            Self::AccessoryInformation => None,
            Self::TemperatureSensor => Some(CharacteristicKind::CurrentTemperature),
            Self::HumiditySensor => Some(CharacteristicKind::CurrentRelativeHumidity),
            Self::LightSensor => Some(CharacteristicKind::CurrentAmbientLightLevel),
        }
    }
}

/// A typed group of characteristics.
#[derive(Debug)]
pub struct Service {
    kind: ServiceKind,
    accessory: IdentityToken,
    characteristics: RwLock<Vec<Arc<Characteristic>>>,
    notifier: SharedNotifier,
}

impl Service {
    pub(crate) fn new(kind: ServiceKind, accessory: IdentityToken, notifier: SharedNotifier) -> Self {
        Self {
            kind,
            accessory,
            characteristics: RwLock::new(Vec::new()),
            notifier,
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// Get a characteristic, creating an empty slot if the service lacks one.
    pub fn characteristic(&self, kind: CharacteristicKind) -> Arc<Characteristic> {
        if let Some(existing) = self.find(kind) {
            return existing;
        }
        let mut characteristics = self.characteristics.write();
        // Re-check under the write lock; another writer may have raced us.
        if let Some(existing) = characteristics.iter().find(|c| c.kind() == kind) {
            return existing.clone();
        }
        let created = Arc::new(Characteristic::new(
            kind,
            self.kind,
            self.accessory,
            self.notifier.clone(),
        ));
        characteristics.push(created.clone());
        created
    }

    /// Write a characteristic value. Returns `self` for chaining.
    pub fn set_characteristic(
        &self,
        kind: CharacteristicKind,
        value: impl Into<CharacteristicValue>,
    ) -> &Self {
        self.characteristic(kind).set(value.into());
        self
    }

    /// Read a characteristic value without creating the slot.
    pub fn value(&self, kind: CharacteristicKind) -> Option<CharacteristicValue> {
        self.find(kind).and_then(|c| c.value())
    }

    /// Numeric value of a characteristic, if set and numeric.
    pub fn number(&self, kind: CharacteristicKind) -> Option<f64> {
        self.value(kind).and_then(|v| v.as_f64())
    }

    pub fn characteristics(&self) -> Vec<Arc<Characteristic>> {
        self.characteristics.read().clone()
    }

    fn find(&self, kind: CharacteristicKind) -> Option<Arc<Characteristic>> {
        self.characteristics
            .read()
            .iter()
            .find(|c| c.kind() == kind)
            .cloned()
    }
}
