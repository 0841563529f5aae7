//! Typed accessory context.
//!
//! The host persists an untyped context bag with each accessory. This bridge
//! stores a versioned [`DeviceContext`] there and validates it on load, so a
//! restored record written by an incompatible release is detected instead of
//! silently misread.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Current context schema version.
pub const CONTEXT_VERSION: u32 = 1;

/// One physical sensor as known to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Opaque, stable key; the accessory identity is derived from it.
    pub sensor_id: String,
    /// Name shown in the home app.
    pub display_name: String,
}

impl DeviceDescriptor {
    pub fn new(sensor_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Context record stored on each accessory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceContext {
    pub version: u32,
    pub device: DeviceDescriptor,
}

impl DeviceContext {
    pub fn new(device: DeviceDescriptor) -> Self {
        Self {
            version: CONTEXT_VERSION,
            device,
        }
    }

    /// Decode and validate a raw context bag.
    pub fn from_value(raw: &serde_json::Value) -> Result<Self> {
        if raw.is_null() {
            return Err(BridgeError::InvalidContext("context is empty".into()));
        }
        let context: DeviceContext = serde_json::from_value(raw.clone())
            .map_err(|e| BridgeError::InvalidContext(e.to_string()))?;
        if context.version != CONTEXT_VERSION {
            return Err(BridgeError::InvalidContext(format!(
                "schema version {}, expected {}",
                context.version, CONTEXT_VERSION
            )));
        }
        if context.device.sensor_id.is_empty() {
            return Err(BridgeError::InvalidContext("empty sensorId".into()));
        }
        Ok(context)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "version": self.version,
            "device": {
                "sensorId": self.device.sensor_id,
                "displayName": self.device.display_name,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_through_bag() {
        let ctx = DeviceContext::new(DeviceDescriptor::new("tempe-sensor-id", "Temperature Sensor"));
        let decoded = DeviceContext::from_value(&ctx.to_value()).unwrap();
        assert_eq!(decoded, ctx);
    }

    #[test]
    fn test_unversioned_bag_is_rejected() {
        // Shape written by releases that stored the bare descriptor.
        let raw = json!({ "device": { "sensorId": "x", "displayName": "X" } });
        let err = DeviceContext::from_value(&raw).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidContext(_)));
    }

    #[test]
    fn test_future_version_is_rejected() {
        let raw = json!({ "version": 2, "device": { "sensorId": "x", "displayName": "X" } });
        let err = DeviceContext::from_value(&raw).unwrap_err();
        assert!(err.to_string().contains("schema version 2"));
    }

    #[test]
    fn test_empty_bag_is_rejected() {
        assert!(DeviceContext::from_value(&serde_json::Value::Null).is_err());
        assert!(DeviceContext::from_value(&json!({})).is_err());
    }

    #[test]
    fn test_descriptor_uses_camel_case() {
        let d: DeviceDescriptor =
            serde_json::from_value(json!({ "sensorId": "a", "displayName": "A" })).unwrap();
        assert_eq!(d, DeviceDescriptor::new("a", "A"));
    }
}
