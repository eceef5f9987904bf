//! BLE communication module.
//!
//! The [`Transport`] trait is the seam between the session and the radio.
//! [`BleTransport`] implements it on top of btleplug.

pub mod central;
pub mod transport;
pub mod uuids;

pub use central::BleTransport;
pub use transport::{
    AdapterState, CharacteristicRef, DeviceHandle, Transport, TransportEvent, TransportOperation,
};
pub use uuids::*;
