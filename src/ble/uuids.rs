//! BLE Service and Characteristic UUIDs.
//!
//! Contains the UUID constants of the Mi Band 2 characteristics this crate
//! knows how to use.

use uuid::Uuid;

/// Bluetooth SIG base UUID, into which 16-bit short UUIDs are spliced.
pub const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_00805f9b34fb;

// Standard BLE characteristics
/// Current Time characteristic UUID (Read).
pub const DATE_TIME_UUID: Uuid = Uuid::from_u128(0x0000_2a2b_0000_1000_8000_00805f9b34fb);
/// Alert Level characteristic UUID (Write Without Response).
pub const ALERT_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a06_0000_1000_8000_00805f9b34fb);
/// Heart Rate Measurement characteristic UUID (Notify).
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_00805f9b34fb);
/// Heart Rate Control Point characteristic UUID (Write).
pub const HEART_RATE_CONTROL_POINT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a39_0000_1000_8000_00805f9b34fb);

// Mi Band vendor characteristics
/// Configuration characteristic UUID.
pub const CONFIGURATION_UUID: Uuid = Uuid::from_u128(0x0000_0003_0000_3512_2118_0009af100700);
/// Battery info characteristic UUID (Read).
pub const BATTERY_UUID: Uuid = Uuid::from_u128(0x0000_0006_0000_3512_2118_0009af100700);
/// Activity (steps/distance/calories) characteristic UUID (Read, Notify).
pub const ACTIVITY_UUID: Uuid = Uuid::from_u128(0x0000_0007_0000_3512_2118_0009af100700);
/// Authentication characteristic UUID.
pub const AUTH_UUID: Uuid = Uuid::from_u128(0x0000_0009_0000_3512_2118_0009af100700);
/// Device event (button press, fall asleep) characteristic UUID.
pub const DEVICE_EVENT_UUID: Uuid = Uuid::from_u128(0x0000_0010_0000_3512_2118_0009af100700);

/// Expand a 16-bit SIG-assigned UUID into its full 128-bit form.
pub const fn uuid_from_short(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Parse a wire identifier.
///
/// Accepts the 4-hex-digit short form (`"2A37"`) as well as the full
/// hyphenated form, case-insensitively.
pub fn parse_wire_id(identifier: &str) -> Option<Uuid> {
    if identifier.len() == 4 {
        return u16::from_str_radix(identifier, 16)
            .ok()
            .map(uuid_from_short);
    }

    Uuid::parse_str(identifier).ok()
}
