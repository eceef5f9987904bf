//! btleplug-backed transport.
//!
//! Every [`Transport`] request spawns a short task on the runtime that was
//! current when the transport was created. Results flow back as
//! [`TransportEvent`]s on the channel returned by [`BleTransport::new`].

use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{
    AdapterState, CharacteristicRef, DeviceHandle, Transport, TransportEvent, TransportOperation,
};
use crate::error::{Error, Result};

/// A peripheral seen during scanning.
#[derive(Clone)]
struct KnownDevice {
    peripheral: Peripheral,
    handle: DeviceHandle,
}

/// State shared with the spawned tasks.
struct Shared {
    devices: RwLock<HashMap<String, KnownDevice>>,
    characteristics: RwLock<HashMap<(String, Uuid), Characteristic>>,
    /// Devices whose next disconnect was requested locally.
    closing: Mutex<HashSet<String>>,
    /// In-flight connection attempts, by device id.
    connecting: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Notification pumps, by device id.
    listeners: Mutex<HashMap<String, JoinHandle<()>>>,
    events: mpsc::Sender<TransportEvent>,
}

impl Shared {
    async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            trace!("Transport event dropped, receiver closed");
        }
    }

    fn device(&self, device_id: &str) -> Result<KnownDevice> {
        self.devices
            .read()
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::transport(format!("unknown device {}", device_id)))
    }

    fn characteristic(
        &self,
        characteristic: &CharacteristicRef,
    ) -> Result<(Peripheral, Characteristic)> {
        let device = self.device(characteristic.device_id())?;
        let found = self
            .characteristics
            .read()
            .get(&(characteristic.device_id().to_string(), characteristic.uuid()))
            .cloned()
            .ok_or_else(|| {
                Error::transport(format!("characteristic {} not discovered", characteristic.uuid()))
            })?;
        Ok((device.peripheral, found))
    }

    fn handle_for(&self, id: &str) -> DeviceHandle {
        self.devices
            .read()
            .get(id)
            .map(|device| device.handle.clone())
            .unwrap_or_else(|| DeviceHandle::new(id, None))
    }
}

/// [`Transport`] on top of a btleplug adapter.
pub struct BleTransport {
    adapter: Adapter,
    runtime: Handle,
    shared: Arc<Shared>,
    event_pump: Option<JoinHandle<()>>,
}

impl BleTransport {
    /// Open the first Bluetooth adapter.
    ///
    /// Returns the transport and the receiving end of its event channel.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(capacity: usize) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Self::with_adapter(adapter, capacity).await
    }

    /// Create a transport on a specific adapter.
    pub async fn with_adapter(
        adapter: Adapter,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let (events, rx) = mpsc::channel(capacity.max(1));
        let central_events = adapter.events().await.map_err(Error::Bluetooth)?;

        let shared = Arc::new(Shared {
            devices: RwLock::new(HashMap::new()),
            characteristics: RwLock::new(HashMap::new()),
            closing: Mutex::new(HashSet::new()),
            connecting: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            events,
        });

        let pump_adapter = adapter.clone();
        let pump_shared = shared.clone();
        let event_pump = tokio::spawn(async move {
            let mut central_events = central_events;
            while let Some(event) = central_events.next().await {
                Self::handle_central_event(event, &pump_adapter, &pump_shared).await;
            }
            debug!("Adapter event stream ended");
        });

        // Scanning needs a powered adapter; report it up front so the
        // session can start without waiting for a state change.
        if let Ok(state) = adapter.adapter_state().await {
            shared
                .emit(TransportEvent::AdapterStateChanged(adapter_state(state)))
                .await;
        }

        let transport = Self {
            adapter,
            runtime: Handle::current(),
            shared,
            event_pump: Some(event_pump),
        };

        Ok((transport, rx))
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn handle_central_event(event: CentralEvent, adapter: &Adapter, shared: &Arc<Shared>) {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                Self::process_peripheral(adapter, id, shared).await;
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
            }
            CentralEvent::DeviceDisconnected(id) => {
                let id = id.to_string();
                debug!("Device disconnected: {}", id);

                if let Some(listener) = shared.listeners.lock().remove(&id) {
                    listener.abort();
                }

                let requested = shared.closing.lock().remove(&id);
                let error = if requested {
                    None
                } else {
                    Some("connection lost".to_string())
                };

                let device = shared.handle_for(&id);
                shared
                    .emit(TransportEvent::Disconnected { device, error })
                    .await;
            }
            CentralEvent::StateUpdate(state) => {
                shared
                    .emit(TransportEvent::AdapterStateChanged(adapter_state(state)))
                    .await;
            }
            _ => {}
        }
    }

    async fn process_peripheral(adapter: &Adapter, id: PeripheralId, shared: &Arc<Shared>) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let local_name = match peripheral.properties().await {
            Ok(Some(properties)) => properties.local_name,
            _ => None,
        };

        let identifier = id.to_string();
        let handle = DeviceHandle::new(identifier.clone(), local_name);

        let changed = {
            let mut devices = shared.devices.write();
            let changed = devices
                .get(&identifier)
                .map(|known| known.handle != handle)
                .unwrap_or(true);
            devices.insert(
                identifier,
                KnownDevice {
                    peripheral,
                    handle: handle.clone(),
                },
            );
            changed
        };

        if changed {
            trace!("Reporting device {}", handle);
            shared.emit(TransportEvent::DeviceDiscovered(handle)).await;
        }
    }

    fn start_listener(shared: &Arc<Shared>, device_id: String, peripheral: Peripheral) {
        let task_shared = shared.clone();
        let task_device_id = device_id.clone();

        let handle = tokio::spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to get notifications stream: {}", e);
                    return;
                }
            };

            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification from {}: {:02X?}",
                    notification.uuid,
                    notification.value
                );
                task_shared
                    .emit(TransportEvent::ValueUpdated {
                        characteristic: CharacteristicRef::new(
                            task_device_id.clone(),
                            notification.uuid,
                        ),
                        value: Bytes::from(notification.value),
                    })
                    .await;
            }

            debug!("Notification listener for {} stopped", task_device_id);
        });

        if let Some(previous) = shared.listeners.lock().insert(device_id, handle) {
            previous.abort();
        }
    }

    fn spawn_operation<F>(
        &self,
        characteristic: &CharacteristicRef,
        operation: TransportOperation,
        request: F,
    ) where
        F: std::future::Future<Output = std::result::Result<Option<Vec<u8>>, btleplug::Error>>
            + Send
            + 'static,
    {
        let shared = self.shared.clone();
        let characteristic = characteristic.clone();

        self.runtime.spawn(async move {
            match request.await {
                Ok(Some(value)) => {
                    shared
                        .emit(TransportEvent::ValueUpdated {
                            characteristic,
                            value: Bytes::from(value),
                        })
                        .await;
                }
                Ok(None) => {}
                Err(e) => {
                    debug!("{} {} failed: {}", operation, characteristic.uuid(), e);
                    shared
                        .emit(TransportEvent::OperationFailed {
                            characteristic,
                            operation,
                            reason: e.to_string(),
                        })
                        .await;
                }
            }
        });
    }
}

impl Transport for BleTransport {
    fn scan(&self) -> Result<()> {
        info!("Starting BLE scan");
        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                error!("Failed to start scan: {}", e);
            }
        });
        Ok(())
    }

    fn stop_scan(&self) -> Result<()> {
        info!("Stopping BLE scan");
        let adapter = self.adapter.clone();
        self.runtime.spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        });
        Ok(())
    }

    fn connect(&self, device: &DeviceHandle) -> Result<()> {
        let known = self.shared.device(device.id())?;
        let shared = self.shared.clone();
        let device = known.handle.clone();
        let device_id = device.id().to_string();

        debug!("Connecting to {}", device);

        let task = self.runtime.spawn(async move {
            let result = known.peripheral.connect().await;
            shared.connecting.lock().remove(device.id());

            match result {
                Ok(()) => {
                    Self::start_listener(&shared, device.id().to_string(), known.peripheral);
                    shared.emit(TransportEvent::Connected(device)).await;
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", device, e);
                    shared
                        .emit(TransportEvent::FailedToConnect {
                            device,
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        });

        if let Some(previous) = self.shared.connecting.lock().insert(device_id, task) {
            previous.abort();
        }
        Ok(())
    }

    fn disconnect(&self, device: &DeviceHandle) -> Result<()> {
        let known = self.shared.device(device.id())?;
        let shared = self.shared.clone();
        shared.closing.lock().insert(device.id().to_string());

        self.runtime.spawn(async move {
            if let Err(e) = known.peripheral.disconnect().await {
                warn!("Failed to disconnect {}: {}", known.handle, e);
                shared.closing.lock().remove(known.handle.id());
            }
        });
        Ok(())
    }

    fn cancel_connection(&self, device: &DeviceHandle) -> Result<()> {
        let known = self.shared.device(device.id())?;
        let shared = self.shared.clone();

        if let Some(attempt) = shared.connecting.lock().remove(device.id()) {
            attempt.abort();
        }
        shared.closing.lock().insert(device.id().to_string());

        self.runtime.spawn(async move {
            if known.peripheral.is_connected().await.unwrap_or(false) {
                if let Err(e) = known.peripheral.disconnect().await {
                    warn!("Failed to cancel {}: {}", known.handle, e);
                }
                return;
            }

            // No link, so the adapter will not report a disconnect.
            shared.closing.lock().remove(known.handle.id());
            shared
                .emit(TransportEvent::Disconnected {
                    device: known.handle,
                    error: None,
                })
                .await;
        });
        Ok(())
    }

    fn discover_characteristics(&self, device: &DeviceHandle) -> Result<()> {
        let known = self.shared.device(device.id())?;
        let shared = self.shared.clone();

        self.runtime.spawn(async move {
            if let Err(e) = known.peripheral.discover_services().await {
                warn!("Service discovery failed for {}: {}", known.handle, e);
                shared
                    .emit(TransportEvent::FailedToConnect {
                        device: known.handle.clone(),
                        error: e.to_string(),
                    })
                    .await;
                // Drop the link so the session can retry.
                let _ = known.peripheral.disconnect().await;
                return;
            }

            let device_id = known.handle.id().to_string();
            let found = known.peripheral.characteristics();
            debug!("Discovered {} characteristics on {}", found.len(), known.handle);

            let mut refs = Vec::with_capacity(found.len());
            {
                let mut cache = shared.characteristics.write();
                cache.retain(|(owner, _), _| owner != &device_id);
                for characteristic in found {
                    refs.push(CharacteristicRef::new(device_id.clone(), characteristic.uuid));
                    cache.insert((device_id.clone(), characteristic.uuid), characteristic);
                }
            }

            shared
                .emit(TransportEvent::CharacteristicsDiscovered {
                    device: known.handle,
                    characteristics: refs,
                })
                .await;
        });
        Ok(())
    }

    fn read_characteristic(&self, characteristic: &CharacteristicRef) -> Result<()> {
        let (peripheral, found) = self.shared.characteristic(characteristic)?;
        trace!("Reading {}", found.uuid);

        self.spawn_operation(characteristic, TransportOperation::Read, async move {
            peripheral.read(&found).await.map(Some)
        });
        Ok(())
    }

    fn write_characteristic(
        &self,
        characteristic: &CharacteristicRef,
        data: &[u8],
        ack_required: bool,
    ) -> Result<()> {
        let (peripheral, found) = self.shared.characteristic(characteristic)?;
        let data = data.to_vec();
        let write_type = if ack_required {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        trace!("Writing {:02X?} to {}", data, found.uuid);

        self.spawn_operation(characteristic, TransportOperation::Write, async move {
            peripheral
                .write(&found, &data, write_type)
                .await
                .map(|_| None)
        });
        Ok(())
    }

    fn set_notify(&self, characteristic: &CharacteristicRef, enabled: bool) -> Result<()> {
        let (peripheral, found) = self.shared.characteristic(characteristic)?;
        debug!("Notifications for {}: {}", found.uuid, enabled);

        self.spawn_operation(characteristic, TransportOperation::Notify, async move {
            if enabled {
                peripheral.subscribe(&found).await.map(|_| None)
            } else {
                peripheral.unsubscribe(&found).await.map(|_| None)
            }
        });
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        if let Some(pump) = self.event_pump.take() {
            pump.abort();
        }
        for (_, listener) in self.shared.listeners.lock().drain() {
            listener.abort();
        }
        for (_, attempt) in self.shared.connecting.lock().drain() {
            attempt.abort();
        }
    }
}

fn adapter_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_state_mapping() {
        assert_eq!(adapter_state(CentralState::PoweredOn), AdapterState::PoweredOn);
        assert_eq!(adapter_state(CentralState::PoweredOff), AdapterState::PoweredOff);
        assert_eq!(adapter_state(CentralState::Unknown), AdapterState::Unknown);
    }

    #[test]
    fn test_transport_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BleTransport>();
    }
}
