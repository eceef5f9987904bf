//! Transport abstraction.
//!
//! The session never talks to a radio directly. It issues fire-and-forget
//! requests through [`Transport`] and learns about their outcome from the
//! [`TransportEvent`]s the transport delivers afterwards.

use bytes::Bytes;
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::CharacteristicId;

/// Name given to devices that do not advertise one.
pub const UNNAMED_DEVICE: &str = "Unnamed";

/// Reference to a discovered remote device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    id: String,
    name: String,
}

impl DeviceHandle {
    /// Create a handle. A missing name becomes `"Unnamed"`.
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.unwrap_or_else(|| UNNAMED_DEVICE.to_string()),
        }
    }

    /// Transport-specific identifier of the device.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable advertised name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Reference to a characteristic on a specific device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    device_id: String,
    uuid: Uuid,
}

impl CharacteristicRef {
    /// Create a reference.
    pub fn new(device_id: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            device_id: device_id.into(),
            uuid,
        }
    }

    /// Identifier of the device owning this characteristic.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// UUID of the characteristic.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The recognized characteristic, if any.
    pub fn characteristic_id(&self) -> Option<CharacteristicId> {
        CharacteristicId::from_uuid(&self.uuid)
    }
}

/// Power state of the local adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdapterState {
    /// State not yet known.
    #[default]
    Unknown,
    /// Adapter is on and usable.
    PoweredOn,
    /// Adapter is off.
    PoweredOff,
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::PoweredOn => write!(f, "powered on"),
            Self::PoweredOff => write!(f, "powered off"),
        }
    }
}

/// Kind of characteristic operation that failed asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOperation {
    /// A characteristic read.
    Read,
    /// A characteristic write.
    Write,
    /// Enabling or disabling notifications.
    Notify,
}

impl std::fmt::Display for TransportOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Notify => write!(f, "notify"),
        }
    }
}

/// Events delivered by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The adapter's power state changed.
    AdapterStateChanged(AdapterState),
    /// A device was seen while scanning.
    DeviceDiscovered(DeviceHandle),
    /// A connection attempt succeeded.
    Connected(DeviceHandle),
    /// A connection attempt failed.
    FailedToConnect {
        /// The device that could not be connected.
        device: DeviceHandle,
        /// Why the attempt failed.
        error: String,
    },
    /// A device disconnected. `error` is `None` for a requested disconnect.
    Disconnected {
        /// The device that disconnected.
        device: DeviceHandle,
        /// The link error, if the disconnect was not requested.
        error: Option<String>,
    },
    /// Characteristic discovery finished for a device.
    CharacteristicsDiscovered {
        /// The device that was searched.
        device: DeviceHandle,
        /// Every characteristic found.
        characteristics: Vec<CharacteristicRef>,
    },
    /// A read completed or a notification arrived.
    ValueUpdated {
        /// The characteristic whose value changed.
        characteristic: CharacteristicRef,
        /// The new value.
        value: Bytes,
    },
    /// A previously accepted read, write or notify request failed.
    OperationFailed {
        /// The characteristic the request targeted.
        characteristic: CharacteristicRef,
        /// What kind of request it was.
        operation: TransportOperation,
        /// Why it failed.
        reason: String,
    },
}

/// Capability to drive the radio link.
///
/// Every method returns as soon as the request is queued. An `Err` means the
/// request was rejected outright; completion and late failures arrive as
/// [`TransportEvent`]s.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Start scanning for devices.
    fn scan(&self) -> Result<()>;

    /// Stop scanning.
    fn stop_scan(&self) -> Result<()>;

    /// Connect to a discovered device.
    fn connect(&self, device: &DeviceHandle) -> Result<()>;

    /// Disconnect a connected device.
    fn disconnect(&self, device: &DeviceHandle) -> Result<()>;

    /// Cancel a pending or established connection.
    fn cancel_connection(&self, device: &DeviceHandle) -> Result<()>;

    /// Discover all services and characteristics of a connected device.
    fn discover_characteristics(&self, device: &DeviceHandle) -> Result<()>;

    /// Read a characteristic value.
    fn read_characteristic(&self, characteristic: &CharacteristicRef) -> Result<()>;

    /// Write a characteristic value.
    fn write_characteristic(
        &self,
        characteristic: &CharacteristicRef,
        data: &[u8],
        ack_required: bool,
    ) -> Result<()>;

    /// Enable or disable notifications for a characteristic.
    fn set_notify(&self, characteristic: &CharacteristicRef, enabled: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::HEART_RATE_MEASUREMENT_UUID;

    #[test]
    fn test_unnamed_device() {
        let device = DeviceHandle::new("AA:BB", None);
        assert_eq!(device.name(), "Unnamed");
        assert_eq!(device.to_string(), "Unnamed (AA:BB)");
    }

    #[test]
    fn test_characteristic_ref() {
        let characteristic = CharacteristicRef::new("AA:BB", HEART_RATE_MEASUREMENT_UUID);
        assert_eq!(characteristic.device_id(), "AA:BB");
        assert_eq!(
            characteristic.characteristic_id(),
            Some(CharacteristicId::HeartRateMeasurement)
        );
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// A transport request, as seen by [`RecordingTransport`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Scan,
        StopScan,
        Connect(String),
        Disconnect(String),
        CancelConnection(String),
        Discover(String),
        Read(Uuid),
        Write(Uuid, Vec<u8>, bool),
        Notify(Uuid, bool),
    }

    /// Transport that accepts every request and remembers it.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingTransport {
        calls: Arc<Mutex<Vec<Call>>>,
        reject_writes: Arc<AtomicBool>,
    }

    impl RecordingTransport {
        /// Record writes but refuse them from now on.
        pub(crate) fn reject_writes(&self) {
            self.reject_writes.store(true, Ordering::SeqCst);
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        pub(crate) fn take_calls(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock())
        }

        pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Write(_, data, _) => Some(data),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: Call) -> Result<()> {
            self.calls.lock().push(call);
            Ok(())
        }
    }

    impl Transport for RecordingTransport {
        fn scan(&self) -> Result<()> {
            self.record(Call::Scan)
        }

        fn stop_scan(&self) -> Result<()> {
            self.record(Call::StopScan)
        }

        fn connect(&self, device: &DeviceHandle) -> Result<()> {
            self.record(Call::Connect(device.id().to_string()))
        }

        fn disconnect(&self, device: &DeviceHandle) -> Result<()> {
            self.record(Call::Disconnect(device.id().to_string()))
        }

        fn cancel_connection(&self, device: &DeviceHandle) -> Result<()> {
            self.record(Call::CancelConnection(device.id().to_string()))
        }

        fn discover_characteristics(&self, device: &DeviceHandle) -> Result<()> {
            self.record(Call::Discover(device.id().to_string()))
        }

        fn read_characteristic(&self, characteristic: &CharacteristicRef) -> Result<()> {
            self.record(Call::Read(characteristic.uuid()))
        }

        fn write_characteristic(
            &self,
            characteristic: &CharacteristicRef,
            data: &[u8],
            ack_required: bool,
        ) -> Result<()> {
            self.record(Call::Write(
                characteristic.uuid(),
                data.to_vec(),
                ack_required,
            ))?;
            if self.reject_writes.load(Ordering::SeqCst) {
                return Err(Error::transport("write rejected"));
            }
            Ok(())
        }

        fn set_notify(&self, characteristic: &CharacteristicRef, enabled: bool) -> Result<()> {
            self.record(Call::Notify(characteristic.uuid(), enabled))
        }
    }
}
