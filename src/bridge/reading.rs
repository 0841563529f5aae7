//! Sensor readings as served by the `/sensors/tphb` endpoint.
//!
//! Payload shape: `{ "tempe": 23.4, "humi": 55.2, "bright": 310 }`.
//! All three fields are required; a reading is validated before any
//! characteristic is written.

use crate::accessory::{CharacteristicKind, ServiceKind};
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Temperature range accepted from the endpoint, in °C.
pub const TEMPERATURE_RANGE: (f64, f64) = (-270.0, 100.0);
/// Relative humidity range, in percent.
pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
/// Ambient light range, in lux.
pub const BRIGHTNESS_RANGE: (f64, f64) = (0.0, 100_000.0);

/// One successful poll, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Degrees Celsius
    #[serde(rename = "tempe")]
    pub temperature: f64,
    /// Percent relative humidity
    #[serde(rename = "humi")]
    pub humidity: f64,
    /// Lux
    #[serde(rename = "bright")]
    pub brightness: f64,
}

impl Reading {
    /// Decode a response body. Missing or non-numeric fields are errors.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Check every field against its characteristic's range.
    pub fn validate(&self) -> Result<()> {
        for kind in ReadingKind::iter() {
            let value = self.value(kind);
            let (min, max) = kind.range();
            if !value.is_finite() || value < min || value > max {
                return Err(BridgeError::OutOfRange {
                    field: kind.field_name(),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn value(&self, kind: ReadingKind) -> f64 {
        match kind {
            ReadingKind::Temperature => self.temperature,
            ReadingKind::Humidity => self.humidity,
            ReadingKind::Brightness => self.brightness,
        }
    }
}

/// The three quantities a sensor reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ReadingKind {
    Temperature,
    Humidity,
    Brightness,
}

impl ReadingKind {
    /// Service that exposes this quantity.
    pub const fn service_kind(&self) -> ServiceKind {
        match self {
            Self::Temperature => ServiceKind::TemperatureSensor,
            Self::Humidity => ServiceKind::HumiditySensor,
            Self::Brightness => ServiceKind::LightSensor,
        }
    }

    /// Characteristic that carries this quantity.
    pub const fn characteristic(&self) -> CharacteristicKind {
        match self {
            Self::Temperature => CharacteristicKind::CurrentTemperature,
            Self::Humidity => CharacteristicKind::CurrentRelativeHumidity,
            Self::Brightness => CharacteristicKind::CurrentAmbientLightLevel,
        }
    }

    /// Wire name in the endpoint payload.
    pub const fn field_name(&self) -> &'static str {
        match self {
            Self::Temperature => "tempe",
            Self::Humidity => "humi",
            Self::Brightness => "bright",
        }
    }

    pub const fn range(&self) -> (f64, f64) {
        match self {
            Self::Temperature => TEMPERATURE_RANGE,
            Self::Humidity => HUMIDITY_RANGE,
            Self::Brightness => BRIGHTNESS_RANGE,
        }
    }
}
