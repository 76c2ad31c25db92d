//! BLE scanning functionality.
//!
//! Provides bounded-window passive discovery of advertising peripherals.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::device::{DeviceAddress, DiscoveredDevice};
use crate::error::{Error, Result};

/// Default scan window used when the caller has no preference.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(10);

/// BLE scanner for discovering advertising peripherals.
///
/// Each [`discover`](Scanner::discover) call is self-contained: the radio is
/// put into scanning mode for the window and taken out of it again before the
/// call returns, on every exit path.
pub struct Scanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
}

impl Scanner {
    /// Create a new scanner on the first system Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`] if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::AdapterUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::AdapterUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Create a scanner on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Scan for `scan_window` and return a snapshot of every distinct
    /// peripheral observed.
    ///
    /// Each address appears at most once; when a peripheral advertises more
    /// than once in the window, the most recently observed signal strength
    /// and name win. Result ordering is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Adapter`] if scanning cannot be started; no partial
    /// scan is performed in that case.
    pub async fn discover(&self, scan_window: Duration) -> Result<Vec<DiscoveredDevice>> {
        info!("Starting BLE scan for {:?}", scan_window);

        // Take the event stream first so no advertisement between scan start
        // and the first poll is missed.
        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|source| Error::Adapter { source })?;

        // The guard covers cancellation of this future mid-window; the
        // explicit stop below covers the normal path.
        let mut guard = ScanStopGuard::new(self.adapter.clone());

        let deadline = Instant::now() + scan_window;
        let mut sightings: HashMap<DeviceAddress, DiscoveredDevice> = HashMap::new();

        loop {
            tokio::select! {
                Some(event) = events.next() => {
                    match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                            if let Some(device) = self.snapshot_peripheral(&id).await {
                                record_sighting(&mut sightings, device);
                            }
                        }
                        _ => {}
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    break;
                }
            }
        }

        guard.disarm();
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        let devices: Vec<_> = sightings.into_values().collect();
        info!("Scan complete: {} device(s) observed", devices.len());

        Ok(devices)
    }

    /// Run a full [`discover`](Scanner::discover) and return the first device
    /// matching `predicate`.
    ///
    /// The scan always completes the whole window before filtering, since
    /// peripherals may advertise intermittently.
    pub async fn find<P>(
        &self,
        predicate: P,
        scan_window: Duration,
    ) -> Result<Option<DiscoveredDevice>>
    where
        P: Fn(&DiscoveredDevice) -> bool,
    {
        let devices = self.discover(scan_window).await?;
        Ok(devices.into_iter().find(|d| predicate(d)))
    }

    /// Build a snapshot of one sighted peripheral.
    async fn snapshot_peripheral(&self, id: &PeripheralId) -> Option<DiscoveredDevice> {
        let peripheral = match self.adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral {:?}: {}", id, e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        trace!(
            "Sighted {} (name: {:?}, rssi: {:?})",
            properties.address,
            properties.local_name,
            properties.rssi
        );

        Some(DiscoveredDevice {
            address: DeviceAddress::new(properties.address.to_string()),
            name: properties.local_name,
            rssi: properties.rssi,
            manufacturer_data: properties.manufacturer_data,
        })
    }
}

/// Fold one sighting into the scan snapshot.
///
/// Later sightings overwrite earlier ones for the same address; a field the
/// later advertisement did not carry keeps its previously observed value
/// (advertisements and scan responses carry different subsets).
fn record_sighting(
    sightings: &mut HashMap<DeviceAddress, DiscoveredDevice>,
    mut device: DiscoveredDevice,
) {
    if let Some(previous) = sightings.remove(&device.address) {
        device.name = device.name.or(previous.name);
        device.rssi = device.rssi.or(previous.rssi);
        for (id, data) in previous.manufacturer_data {
            device.manufacturer_data.entry(id).or_insert(data);
        }
    }
    sightings.insert(device.address.clone(), device);
}

/// Takes the adapter out of scanning mode if the scan future is dropped
/// before completing.
pub(crate) struct ScanStopGuard {
    adapter: Adapter,
    armed: bool,
}

impl ScanStopGuard {
    pub(crate) fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            armed: true,
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ScanStopGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("Scan cancelled mid-window, stopping adapter scan");
            let adapter = self.adapter.clone();
            tokio::spawn(async move {
                if let Err(e) = adapter.stop_scan().await {
                    debug!("Failed to stop cancelled scan: {}", e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn device(address: &str, name: Option<&str>, rssi: Option<i16>) -> DiscoveredDevice {
        DiscoveredDevice {
            address: DeviceAddress::new(address),
            name: name.map(String::from),
            rssi,
            manufacturer_data: HashMap::new(),
        }
    }

    #[test]
    fn test_dedup_last_seen_wins() {
        // Two advertisers, A sighted twice: A keeps the later RSSI.
        let mut sightings = HashMap::new();
        record_sighting(&mut sightings, device("AA:AA", Some("A"), Some(-40)));
        record_sighting(&mut sightings, device("BB:BB", Some("B"), Some(-70)));
        record_sighting(&mut sightings, device("AA:AA", Some("A"), Some(-42)));

        assert_eq!(sightings.len(), 2);
        assert_eq!(sightings[&DeviceAddress::new("AA:AA")].rssi, Some(-42));
        assert_eq!(sightings[&DeviceAddress::new("BB:BB")].rssi, Some(-70));
    }

    #[test]
    fn test_dedup_is_case_insensitive() {
        let mut sightings = HashMap::new();
        record_sighting(&mut sightings, device("aa:bb:cc:dd:ee:ff", None, Some(-50)));
        record_sighting(&mut sightings, device("AA:BB:CC:DD:EE:FF", None, Some(-55)));
        assert_eq!(sightings.len(), 1);
    }

    #[test]
    fn test_absent_fields_keep_previous_value() {
        let mut sightings = HashMap::new();
        record_sighting(&mut sightings, device("AA:AA", Some("Kiosk"), Some(-48)));
        record_sighting(&mut sightings, device("AA:AA", None, None));

        let merged = &sightings[&DeviceAddress::new("AA:AA")];
        assert_eq!(merged.name.as_deref(), Some("Kiosk"));
        assert_eq!(merged.rssi, Some(-48));
    }

    #[test]
    fn test_manufacturer_data_accumulates() {
        let mut first = device("AA:AA", None, None);
        first.manufacturer_data.insert(0x004C, vec![1, 2]);
        let mut second = device("AA:AA", None, None);
        second.manufacturer_data.insert(0x09C7, vec![3]);

        let mut sightings = HashMap::new();
        record_sighting(&mut sightings, first);
        record_sighting(&mut sightings, second);

        let merged = &sightings[&DeviceAddress::new("AA:AA")];
        assert_eq!(merged.manufacturer_data.len(), 2);
    }

    #[test]
    fn test_default_scan_window() {
        assert_eq!(DEFAULT_SCAN_WINDOW, Duration::from_secs(10));
    }
}
