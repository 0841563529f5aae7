//! Fixed metadata for the AccessoryInformation service.

/// Manufacturer, model and serial reported by every bridged sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub serial_number: &'static str,
}

/// Values already stored in existing accessory caches; keep them stable.
pub const ACCESSORY_INFO: AccessoryInfo = AccessoryInfo {
    manufacturer: "Default-Manufacturer",
    model: "Default-Model",
    serial_number: "Default-Serial",
};
