// Allow holding locks across await points - we use parking_lot which is designed for this
#![allow(clippy::await_holding_lock)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # kiosk-ble
//!
//! A cross-platform Rust library for discovering and connecting to Bluetooth
//! Low Energy peripherals attached to kiosk hardware.
//!
//! The scope is discovery and connection establishment: scan the radio medium
//! for advertising peripherals, select a target by address, connect with a
//! bounded timeout, and enumerate the target's service/characteristic
//! topology. Data exchange (reads, writes, notifications) and pairing are out
//! of scope.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kiosk_ble::{ConnectionManager, DeviceAddress, Scanner, DEFAULT_SCAN_WINDOW, Result};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scanner = Scanner::new().await?;
//!
//!     // Scan for advertising peripherals
//!     for device in scanner.discover(DEFAULT_SCAN_WINDOW).await? {
//!         println!(
//!             "{} ({}) RSSI: {:?}",
//!             device.display_name(),
//!             device.address,
//!             device.rssi
//!         );
//!     }
//!
//!     // Connect to a known target and walk its GATT tree
//!     let target = DeviceAddress::new("AA:BB:CC:DD:EE:FF");
//!     let manager = ConnectionManager::new().await?;
//!     let handle = manager.connect(&target, Duration::from_secs(10)).await?;
//!
//!     for service in manager.enumerate(&handle).await? {
//!         println!("Service: {}", service.uuid);
//!         for characteristic in &service.characteristics {
//!             println!("  Characteristic: {}", characteristic.uuid);
//!         }
//!     }
//!
//!     manager.disconnect(&handle).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Peripherals are identified by CoreBluetooth UUIDs, not MAC addresses.
//! Requires Bluetooth permission (`NSBluetoothAlwaysUsageDescription` in
//! Info.plist for bundled apps).
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for the public value types

// Public modules
pub mod connection;
pub mod device;
pub mod error;
pub mod scanner;
pub mod topology;

// Re-exports for convenience
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState, DEFAULT_CONNECT_TIMEOUT};
pub use device::{DeviceAddress, DiscoveredDevice};
pub use error::{ConnectFailure, Error, Result};
pub use scanner::{Scanner, DEFAULT_SCAN_WINDOW};
pub use topology::{CharacteristicDescriptor, CharacteristicProperty, ServiceDescriptor};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<Scanner>();
        let _ = std::any::TypeId::of::<ConnectionManager>();
        let _ = std::any::TypeId::of::<ConnectionState>();
        let _ = std::any::TypeId::of::<DiscoveredDevice>();
        let _ = std::any::TypeId::of::<ServiceDescriptor>();
        let _ = std::any::TypeId::of::<Error>();
    }
}
