//! Characteristic value slots.
//!
//! A characteristic is a single named, typed value within a service. Values
//! can be written from any thread (poll tasks, restore) and carry a version
//! counter for change detection. When the host installs a [`ChangeNotifier`]
//! on the accessory, every value change is pushed to it immediately.

use super::service::ServiceKind;
use crate::identity::IdentityToken;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use strum::{AsRefStr, Display, EnumString};

/// Characteristic types used by this bridge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum CharacteristicKind {
    Name,
    Manufacturer,
    Model,
    SerialNumber,
    /// Degrees Celsius
    CurrentTemperature,
    /// Percent relative humidity
    CurrentRelativeHumidity,
    /// Lux
    CurrentAmbientLightLevel,
}

/// Value held by a characteristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Number(f64),
    Text(String),
}

impl CharacteristicValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl From<f64> for CharacteristicValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for CharacteristicValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CharacteristicValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A value change, as delivered to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicChange {
    pub accessory: IdentityToken,
    pub service: ServiceKind,
    pub characteristic: CharacteristicKind,
    pub value: CharacteristicValue,
}

/// Pushes characteristic changes to the host as they happen.
#[derive(Clone)]
pub struct ChangeNotifier {
    callback: Arc<dyn Fn(&CharacteristicChange) + Send + Sync>,
}

impl ChangeNotifier {
    pub fn new(callback: impl Fn(&CharacteristicChange) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Deliver one change. Non-blocking as long as the callback is.
    pub fn notify(&self, change: &CharacteristicChange) {
        (self.callback)(change);
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangeNotifier")
    }
}

/// Notifier slot shared by every characteristic of one accessory.
pub(crate) type SharedNotifier = Arc<RwLock<Option<ChangeNotifier>>>;

/// A single value slot within a service.
#[derive(Debug)]
pub struct Characteristic {
    kind: CharacteristicKind,
    service: ServiceKind,
    accessory: IdentityToken,
    value: RwLock<Option<CharacteristicValue>>,
    version: AtomicU32,
    notifier: SharedNotifier,
}

impl Characteristic {
    pub(crate) fn new(
        kind: CharacteristicKind,
        service: ServiceKind,
        accessory: IdentityToken,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            kind,
            service,
            accessory,
            value: RwLock::new(None),
            version: AtomicU32::new(0),
            notifier,
        }
    }

    pub fn kind(&self) -> CharacteristicKind {
        self.kind
    }

    /// Current value, `None` until first written.
    pub fn value(&self) -> Option<CharacteristicValue> {
        self.value.read().clone()
    }

    /// Get the current version (incremented on each change).
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Write a value. Increments the version and notifies the host only if
    /// the value actually changed.
    pub fn set(&self, value: CharacteristicValue) {
        {
            let mut slot = self.value.write();
            if slot.as_ref() == Some(&value) {
                return;
            }
            *slot = Some(value.clone());
        }
        self.version.fetch_add(1, Ordering::SeqCst);
        if let Some(notifier) = self.notifier.read().as_ref() {
            notifier.notify(&CharacteristicChange {
                accessory: self.accessory,
                service: self.service,
                characteristic: self.kind,
                value,
            });
        }
    }

    /// Restore a cached value without notifying or bumping the version.
    pub(crate) fn restore(&self, value: CharacteristicValue) {
        *self.value.write() = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn characteristic(notifier: SharedNotifier) -> Characteristic {
        Characteristic::new(
            CharacteristicKind::CurrentTemperature,
            ServiceKind::TemperatureSensor,
            IdentityToken::generate("test"),
            notifier,
        )
    }

    #[test]
    fn test_initial_state() {
        let c = characteristic(SharedNotifier::default());
        assert_eq!(c.value(), None);
        assert_eq!(c.version(), 0);
    }

    #[test]
    fn test_set_increments_version() {
        let c = characteristic(SharedNotifier::default());
        c.set(21.5.into());
        assert_eq!(c.value(), Some(CharacteristicValue::Number(21.5)));
        assert_eq!(c.version(), 1);

        // Setting same value doesn't increment
        c.set(21.5.into());
        assert_eq!(c.version(), 1);

        c.set(22.0.into());
        assert_eq!(c.version(), 2);
    }

    #[test]
    fn test_notifier_receives_changes_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let notifier: SharedNotifier = Arc::new(RwLock::new(Some(ChangeNotifier::new(
            move |change: &CharacteristicChange| sink.lock().push(change.value.clone()),
        ))));

        let c = characteristic(notifier);
        c.set(1.0.into());
        c.set(1.0.into());
        c.set(2.0.into());

        assert_eq!(
            *seen.lock(),
            vec![CharacteristicValue::Number(1.0), CharacteristicValue::Number(2.0)]
        );
    }

    #[test]
    fn test_restore_is_silent() {
        let c = characteristic(SharedNotifier::default());
        c.restore(18.0.into());
        assert_eq!(c.value().and_then(|v| v.as_f64()), Some(18.0));
        assert_eq!(c.version(), 0);
    }

    #[test]
    fn test_kind_parses_from_name() {
        let kind: CharacteristicKind = "CurrentAmbientLightLevel".parse().unwrap();
        assert_eq!(kind, CharacteristicKind::CurrentAmbientLightLevel);
        assert_eq!(kind.as_ref(), "CurrentAmbientLightLevel");
    }
}
