//! BLE connection establishment and GATT topology enumeration.
//!
//! Drives bounded-timeout connection attempts against a target address and,
//! once connected, walks the peripheral's service/characteristic tree.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::device::DeviceAddress;
use crate::error::{ConnectFailure, Error, Result};
use crate::scanner::ScanStopGuard;
use crate::topology::ServiceDescriptor;

/// Default connection timeout, matching typical BLE connection-establishment
/// windows.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection state for a session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport attempt made yet.
    #[default]
    Idle,
    /// Transport handshake in progress.
    Connecting,
    /// Handshake succeeded; enumeration permitted.
    Connected,
    /// Handshake did not complete. Terminal.
    Failed,
    /// A live transport was closed, explicitly or by link loss. Terminal.
    Disconnected,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Failed => write!(f, "Failed"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

type SharedState = Arc<RwLock<ConnectionState>>;

/// Update a shared connection state, logging the transition.
fn set_state(state: &SharedState, address: &DeviceAddress, new_state: ConnectionState) {
    let old_state = {
        let mut guard = state.write();
        let old = *guard;
        *guard = new_state;
        old
    };

    if old_state != new_state {
        debug!("{}: {} -> {}", address, old_state, new_state);
    }
}

/// One live session to a peripheral.
///
/// The handle exclusively owns its transport resource. Dropping a still
/// connected handle releases the transport best-effort; callers that care
/// about the outcome should use [`ConnectionManager::disconnect`].
pub struct ConnectionHandle {
    address: DeviceAddress,
    peripheral: Peripheral,
    state: SharedState,
    /// Watches adapter events for asynchronous transport loss.
    watcher: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectionHandle {
    /// The canonical address of the session target.
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if the session is live.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("address", &self.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.write().take() {
            handle.abort();
        }

        if self.is_connected() {
            warn!(
                "Dropping connected handle to {}, releasing transport",
                self.address
            );
            set_state(&self.state, &self.address, ConnectionState::Disconnected);
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let peripheral = self.peripheral.clone();
                runtime.spawn(async move {
                    let _ = peripheral.disconnect().await;
                });
            }
        }
    }
}

/// Establishes and tears down sessions to peripherals by address.
pub struct ConnectionManager {
    /// The BLE adapter shared by all attempts.
    adapter: Adapter,
}

impl ConnectionManager {
    /// Create a new manager on the first system Bluetooth adapter.
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

        Ok(Self { adapter })
    }

    /// Create a manager on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Attempt a transport-level connection to `address`, bounded by
    /// `timeout`.
    ///
    /// On success the returned handle is in the `Connected` state. On timeout
    /// the in-flight handshake is actively aborted before the error
    /// propagates, so no radio session is leaked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if no peripheral with that address
    /// is observed, or [`Error::Connection`] with a
    /// [`ConnectFailure`] reason when the handshake does not complete.
    pub async fn connect(
        &self,
        address: &DeviceAddress,
        timeout: Duration,
    ) -> Result<ConnectionHandle> {
        let started = Instant::now();
        let state: SharedState = Arc::new(RwLock::new(ConnectionState::Idle));

        let peripheral = self.locate_peripheral(address, timeout).await?;

        set_state(&state, address, ConnectionState::Connecting);
        info!("Connecting to {} (timeout {:?})", address, timeout);

        let remaining = timeout.saturating_sub(started.elapsed());

        match tokio::time::timeout(remaining, peripheral.connect()).await {
            Ok(Ok(())) => {
                info!("Connected to {}", address);
                set_state(&state, address, ConnectionState::Connected);

                let watcher = spawn_loss_watcher(
                    self.adapter.clone(),
                    peripheral.clone(),
                    address.clone(),
                    state.clone(),
                );

                Ok(ConnectionHandle {
                    address: address.clone(),
                    peripheral,
                    state,
                    watcher: RwLock::new(Some(watcher)),
                })
            }
            Ok(Err(e)) => {
                warn!("Connection to {} rejected: {}", address, e);
                // Tear down whatever the adapter half-opened.
                let _ = peripheral.disconnect().await;
                set_state(&state, address, ConnectionState::Failed);
                Err(Error::Connection {
                    address: address.to_string(),
                    reason: classify_connect_error(&e),
                })
            }
            Err(_elapsed) => {
                warn!("Connection to {} timed out after {:?}", address, timeout);
                // Abort the pending handshake, don't just abandon it.
                let _ = peripheral.disconnect().await;
                set_state(&state, address, ConnectionState::Failed);
                Err(Error::Connection {
                    address: address.to_string(),
                    reason: ConnectFailure::Timeout,
                })
            }
        }
    }

    /// Walk the connected peripheral's service table and return it as a
    /// structured snapshot, in the order the platform reports it.
    ///
    /// All-or-nothing: on mid-enumeration transport loss the handle
    /// transitions to `Disconnected` and no partial list is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the handle is not `Connected`, or
    /// [`Error::TransportLost`] if the session drops during the query.
    pub async fn enumerate(&self, handle: &ConnectionHandle) -> Result<Vec<ServiceDescriptor>> {
        let actual = handle.state();
        if !actual.is_connected() {
            return Err(Error::InvalidState {
                expected: ConnectionState::Connected,
                actual,
            });
        }

        debug!("Enumerating services on {}", handle.address);

        if let Err(e) = handle.peripheral.discover_services().await {
            if !handle.peripheral.is_connected().await.unwrap_or(false) {
                warn!("Transport to {} lost during enumeration", handle.address);
                set_state(&handle.state, &handle.address, ConnectionState::Disconnected);
                return Err(Error::TransportLost {
                    address: handle.address.to_string(),
                });
            }
            return Err(Error::Bluetooth(e));
        }

        let services: Vec<_> = handle
            .peripheral
            .services()
            .iter()
            .map(ServiceDescriptor::from_service)
            .collect();

        debug!(
            "Enumerated {} service(s) on {}",
            services.len(),
            handle.address
        );

        Ok(services)
    }

    /// Release the handle's transport resource.
    ///
    /// Idempotent: a handle already in a terminal state (or never connected)
    /// is a no-op, not an error.
    pub async fn disconnect(&self, handle: &ConnectionHandle) -> Result<()> {
        if let Some(watcher) = handle.watcher.write().take() {
            watcher.abort();
        }

        let current = handle.state();
        if !current.is_connected() {
            debug!("disconnect on {} handle, nothing to do", current);
            return Ok(());
        }

        match handle.peripheral.disconnect().await {
            Ok(()) => {
                info!("Disconnected from {}", handle.address);
                set_state(&handle.state, &handle.address, ConnectionState::Disconnected);
                Ok(())
            }
            Err(e) => {
                // The transport is gone either way.
                set_state(&handle.state, &handle.address, ConnectionState::Disconnected);
                Err(Error::Bluetooth(e))
            }
        }
    }

    /// Find the peripheral with `address` among the adapter's known
    /// peripherals, running a bounded locator scan if it has not been seen
    /// yet.
    async fn locate_peripheral(
        &self,
        address: &DeviceAddress,
        budget: Duration,
    ) -> Result<Peripheral> {
        let known = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;
        for peripheral in known {
            if matches_address(&peripheral, address) {
                trace!("{} already known to adapter", address);
                return Ok(peripheral);
            }
        }

        debug!("{} not cached, running locator scan", address);

        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|source| Error::Adapter { source })?;

        let mut guard = ScanStopGuard::new(self.adapter.clone());

        let deadline = Instant::now() + budget;
        let mut located = None;

        loop {
            tokio::select! {
                Some(event) = events.next() => {
                    let id = match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                        _ => continue,
                    };
                    if let Ok(peripheral) = self.adapter.peripheral(&id).await {
                        if matches_address(&peripheral, address) {
                            located = Some(peripheral);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    break;
                }
            }
        }

        guard.disarm();
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        located.ok_or_else(|| Error::DeviceNotFound {
            address: address.to_string(),
        })
    }
}

/// Check whether a peripheral answers to the given canonical address.
///
/// Both the platform peripheral ID (a UUID on macOS) and the BD address are
/// compared, since platforms disagree on which one is meaningful.
fn matches_address(peripheral: &Peripheral, address: &DeviceAddress) -> bool {
    DeviceAddress::new(peripheral.id().to_string()) == *address
        || DeviceAddress::new(peripheral.address().to_string()) == *address
}

/// Classify a btleplug handshake error into a connection failure reason.
fn classify_connect_error(error: &btleplug::Error) -> ConnectFailure {
    match error {
        btleplug::Error::TimedOut(_) => ConnectFailure::Timeout,
        btleplug::Error::PermissionDenied | btleplug::Error::NotSupported(_) => {
            ConnectFailure::AdapterUnavailable
        }
        _ => ConnectFailure::Rejected,
    }
}

/// Watch adapter events for asynchronous loss of this peripheral's transport.
fn spawn_loss_watcher(
    adapter: Adapter,
    peripheral: Peripheral,
    address: DeviceAddress,
    state: SharedState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                debug!("Loss watcher for {} could not get events: {}", address, e);
                return;
            }
        };

        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(id) = event {
                if id == peripheral.id() {
                    warn!("Transport to {} lost", address);
                    set_state(&state, &address, ConnectionState::Disconnected);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Idle.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Failed.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Idle.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(ConnectionState::Idle.to_string(), "Idle");
        assert_eq!(ConnectionState::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn test_set_state_transitions() {
        let address = DeviceAddress::new("AA:BB:CC:DD:EE:FF");
        let state: SharedState = Arc::new(RwLock::new(ConnectionState::Idle));

        set_state(&state, &address, ConnectionState::Connecting);
        assert_eq!(*state.read(), ConnectionState::Connecting);

        set_state(&state, &address, ConnectionState::Connected);
        assert_eq!(*state.read(), ConnectionState::Connected);

        set_state(&state, &address, ConnectionState::Disconnected);
        assert!(state.read().is_terminal());
    }

    #[test]
    fn test_classify_connect_error() {
        assert_eq!(
            classify_connect_error(&btleplug::Error::TimedOut(Duration::from_secs(1))),
            ConnectFailure::Timeout
        );
        assert_eq!(
            classify_connect_error(&btleplug::Error::PermissionDenied),
            ConnectFailure::AdapterUnavailable
        );
        assert_eq!(
            classify_connect_error(&btleplug::Error::NotSupported("connect".to_string())),
            ConnectFailure::AdapterUnavailable
        );
        assert_eq!(
            classify_connect_error(&btleplug::Error::DeviceNotFound),
            ConnectFailure::Rejected
        );
        assert_eq!(
            classify_connect_error(&btleplug::Error::RuntimeError("nope".to_string())),
            ConnectFailure::Rejected
        );
    }

    #[test]
    fn test_default_connect_timeout() {
        assert_eq!(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs(60));
    }
}
