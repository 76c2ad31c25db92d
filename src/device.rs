//! Discovered-device snapshot values.

use std::collections::HashMap;

/// A peripheral address in canonical form.
///
/// Platforms disagree on how they report peripheral identifiers (MAC strings
/// on Linux/Windows, UUIDs on macOS) and on casing. Addresses are uppercased
/// on construction so that two sightings of the same peripheral always
/// compare equal, regardless of how the platform happened to print them.
/// Separator characters are left untouched; each platform reports a single
/// consistent format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Create a canonical address from a platform identifier string.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_ascii_uppercase())
    }

    /// The canonical address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for DeviceAddress {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// A snapshot of one peripheral observed during a scan window.
///
/// Produced fresh per `discover()` call and never mutated afterwards. RSSI
/// and local name are absent when the platform did not report them for any
/// sighting in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveredDevice {
    /// Canonical peripheral address.
    pub address: DeviceAddress,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength of the most recent sighting, in dBm.
    pub rssi: Option<i16>,
    /// Vendor-specific advertisement payloads keyed by manufacturer ID.
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

impl DiscoveredDevice {
    /// Display name for reporting, falling back to "Unknown".
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_address_canonicalization() {
        let a = DeviceAddress::new("aa:bb:cc:dd:ee:ff");
        let b = DeviceAddress::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_address_preserves_format() {
        // macOS-style UUID identifiers keep their separators
        let a = DeviceAddress::new("87d73746-3fec-15a4-37c8-b54190681ab8");
        assert_eq!(a.as_str(), "87D73746-3FEC-15A4-37C8-B54190681AB8");
    }

    #[test]
    fn test_display_name_fallback() {
        let device = DiscoveredDevice {
            address: DeviceAddress::new("AA:BB:CC:DD:EE:FF"),
            name: None,
            rssi: Some(-60),
            manufacturer_data: HashMap::new(),
        };
        assert_eq!(device.display_name(), "Unknown");
    }
}
