// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # miband-rust-ble
//!
//! A Rust library for talking to Xiaomi Mi Band 2 fitness bands over
//! Bluetooth Low Energy.
//!
//! ## Features
//!
//! - **Discovery**: Scan for nearby bands and connect by index
//! - **Stats**: Read band time, activity counters and battery state
//! - **Heart Rate**: Single measurements and continuous monitoring with
//!   automatic keep-alives
//! - **Alerts**: Make the band vibrate
//! - **Health Records**: Forward heart rate measurements to a pluggable sink
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use miband_rust_ble::{MemoryHealthRecords, MiBand, Result, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let health = Arc::new(MemoryHealthRecords::new());
//!     let band = MiBand::new(SessionConfig::default(), health).await?;
//!     band.start_scan().await?;
//!
//!     // Wait for bands to be discovered
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     band.connect(0).await?;
//!     let mut readings = band.subscribe_readings();
//!     while let Ok(reading) = readings.recv().await {
//!         println!("{}", reading);
//!     }
//!
//!     band.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod band;
pub mod ble;
pub mod config;
pub mod data;
pub mod error;
pub mod health;
pub mod logging;
pub mod protocol;
pub mod scheduler;
pub mod session;

// Re-exports for convenience
pub use band::{CallbackHandle, MiBand};
pub use config::SessionConfig;
pub use error::{DecodeError, Error, Result};
pub use health::{HealthRecordSink, HeartRateSample, MemoryHealthRecords};
pub use logging::{LogCategory, LogChannel, LogEntry, LogSink, TracingLogSink};
pub use session::{DeviceSession, SessionState};

// Re-export commonly used types from submodules
pub use ble::{BleTransport, CharacteristicRef, DeviceHandle, Transport, TransportEvent};
pub use data::{ActivityReading, BatteryReading, HeartRateReading, Reading, TimeReading};
pub use protocol::{AlertMode, CharacteristicId, MonitorCommand};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<MiBand>();
        let _ = std::any::TypeId::of::<DeviceSession>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<Reading>();
        let _ = std::any::TypeId::of::<BleTransport>();
        let _ = std::any::TypeId::of::<SessionConfig>();
    }
}
