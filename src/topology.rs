//! GATT topology descriptors.
//!
//! Read-only views of a connected peripheral's service/characteristic tree,
//! produced by [`ConnectionManager::enumerate`](crate::ConnectionManager::enumerate).

use btleplug::api::{CharPropFlags, Characteristic, Service};
use uuid::Uuid;

// Standard GATT services commonly seen on kiosk peripherals
/// Standard BLE Device Information Service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);
/// Standard BLE Battery Service UUID.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_00805f9b34fb);
/// Standard BLE Generic Access Service UUID.
pub const GENERIC_ACCESS_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1800_0000_1000_8000_00805f9b34fb);

/// Capability flag on a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CharacteristicProperty {
    /// Value may appear in broadcast advertisements.
    Broadcast,
    /// Value can be read.
    Read,
    /// Value can be written without an acknowledgement.
    WriteWithoutResponse,
    /// Value can be written with an acknowledgement.
    Write,
    /// Value changes are pushed without acknowledgement.
    Notify,
    /// Value changes are pushed with acknowledgement.
    Indicate,
}

impl std::fmt::Display for CharacteristicProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcast => write!(f, "broadcast"),
            Self::Read => write!(f, "read"),
            Self::WriteWithoutResponse => write!(f, "write-without-response"),
            Self::Write => write!(f, "write"),
            Self::Notify => write!(f, "notify"),
            Self::Indicate => write!(f, "indicate"),
        }
    }
}

impl CharacteristicProperty {
    /// Decode the capability flags present in a btleplug property bitfield.
    ///
    /// Flags this crate does not model (authenticated signed writes, extended
    /// properties) are ignored.
    pub fn from_flags(flags: CharPropFlags) -> Vec<Self> {
        let mut properties = Vec::new();
        if flags.contains(CharPropFlags::BROADCAST) {
            properties.push(Self::Broadcast);
        }
        if flags.contains(CharPropFlags::READ) {
            properties.push(Self::Read);
        }
        if flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
            properties.push(Self::WriteWithoutResponse);
        }
        if flags.contains(CharPropFlags::WRITE) {
            properties.push(Self::Write);
        }
        if flags.contains(CharPropFlags::NOTIFY) {
            properties.push(Self::Notify);
        }
        if flags.contains(CharPropFlags::INDICATE) {
            properties.push(Self::Indicate);
        }
        properties
    }
}

/// One characteristic within a service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CharacteristicDescriptor {
    /// The characteristic's 128-bit UUID.
    pub uuid: Uuid,
    /// Capability flags, in declaration order.
    pub properties: Vec<CharacteristicProperty>,
}

impl CharacteristicDescriptor {
    pub(crate) fn from_characteristic(characteristic: &Characteristic) -> Self {
        Self {
            uuid: characteristic.uuid,
            properties: CharacteristicProperty::from_flags(characteristic.properties),
        }
    }

    /// Whether this characteristic carries the given capability.
    pub fn supports(&self, property: CharacteristicProperty) -> bool {
        self.properties.contains(&property)
    }
}

/// One service on a connected peripheral, with its characteristics in the
/// order the platform reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceDescriptor {
    /// The service's 128-bit UUID.
    pub uuid: Uuid,
    /// Characteristics exposed by this service.
    pub characteristics: Vec<CharacteristicDescriptor>,
}

impl ServiceDescriptor {
    pub(crate) fn from_service(service: &Service) -> Self {
        Self {
            uuid: service.uuid,
            characteristics: service
                .characteristics
                .iter()
                .map(CharacteristicDescriptor::from_characteristic)
                .collect(),
        }
    }

    /// Look up a characteristic by UUID.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicDescriptor> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_property_flags_decode() {
        let flags = CharPropFlags::READ | CharPropFlags::NOTIFY;
        let properties = CharacteristicProperty::from_flags(flags);
        assert_eq!(
            properties,
            vec![CharacteristicProperty::Read, CharacteristicProperty::Notify]
        );
    }

    #[test]
    fn test_property_flags_decode_all() {
        let flags = CharPropFlags::BROADCAST
            | CharPropFlags::READ
            | CharPropFlags::WRITE_WITHOUT_RESPONSE
            | CharPropFlags::WRITE
            | CharPropFlags::NOTIFY
            | CharPropFlags::INDICATE;
        assert_eq!(CharacteristicProperty::from_flags(flags).len(), 6);
    }

    #[test]
    fn test_property_flags_ignore_unmodeled() {
        let flags = CharPropFlags::AUTHENTICATED_SIGNED_WRITES | CharPropFlags::READ;
        let properties = CharacteristicProperty::from_flags(flags);
        assert_eq!(properties, vec![CharacteristicProperty::Read]);
    }

    #[test]
    fn test_property_flags_decode_empty() {
        assert!(CharacteristicProperty::from_flags(CharPropFlags::empty()).is_empty());
    }

    #[test]
    fn test_characteristic_supports() {
        let descriptor = CharacteristicDescriptor {
            uuid: DEVICE_INFO_SERVICE_UUID,
            properties: vec![CharacteristicProperty::Read],
        };
        assert!(descriptor.supports(CharacteristicProperty::Read));
        assert!(!descriptor.supports(CharacteristicProperty::Write));
    }

    #[test]
    fn test_service_characteristic_lookup() {
        let uuid = Uuid::from_u128(0x0000_2a29_0000_1000_8000_00805f9b34fb);
        let service = ServiceDescriptor {
            uuid: DEVICE_INFO_SERVICE_UUID,
            characteristics: vec![CharacteristicDescriptor {
                uuid,
                properties: vec![CharacteristicProperty::Read],
            }],
        };
        assert!(service.characteristic(&uuid).is_some());
        assert!(service.characteristic(&BATTERY_SERVICE_UUID).is_none());
    }

    #[test]
    fn test_property_display() {
        assert_eq!(
            CharacteristicProperty::WriteWithoutResponse.to_string(),
            "write-without-response"
        );
    }
}
