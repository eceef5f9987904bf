//! Static protocol tables.
//!
//! Maps wire UUIDs to the characteristics this crate understands, and holds
//! the fixed command bytes written to the heart rate control point and the
//! alert level characteristic.

use uuid::Uuid;

use crate::ble::uuids::*;

/// A characteristic of the band that this crate recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CharacteristicId {
    /// Current band time.
    DateTime,
    /// Steps, distance and calories.
    Activity,
    /// Battery level and last charge time.
    Battery,
    /// Heart rate notifications.
    HeartRateMeasurement,
    /// Heart rate command sink.
    HeartRateControlPoint,
    /// Vibration alert level.
    Alert,
    /// Pairing/authentication exchange.
    Auth,
    /// Button and wear events.
    DeviceEvent,
    /// Band configuration.
    Configuration,
}

impl CharacteristicId {
    /// Every recognized characteristic.
    pub const ALL: [Self; 9] = [
        Self::DateTime,
        Self::Activity,
        Self::Battery,
        Self::HeartRateMeasurement,
        Self::HeartRateControlPoint,
        Self::Alert,
        Self::Auth,
        Self::DeviceEvent,
        Self::Configuration,
    ];

    /// Look up a characteristic by its UUID.
    pub fn from_uuid(uuid: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.uuid() == *uuid)
    }

    /// Look up a characteristic by its wire identifier string.
    pub fn from_wire_id(identifier: &str) -> Option<Self> {
        parse_wire_id(identifier).and_then(|uuid| Self::from_uuid(&uuid))
    }

    /// The characteristic's UUID.
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::DateTime => DATE_TIME_UUID,
            Self::Activity => ACTIVITY_UUID,
            Self::Battery => BATTERY_UUID,
            Self::HeartRateMeasurement => HEART_RATE_MEASUREMENT_UUID,
            Self::HeartRateControlPoint => HEART_RATE_CONTROL_POINT_UUID,
            Self::Alert => ALERT_LEVEL_UUID,
            Self::Auth => AUTH_UUID,
            Self::DeviceEvent => DEVICE_EVENT_UUID,
            Self::Configuration => CONFIGURATION_UUID,
        }
    }

    /// Whether the characteristic is read on negotiation and by stats updates.
    pub fn is_pollable(&self) -> bool {
        matches!(self, Self::DateTime | Self::Activity | Self::Battery)
    }

    /// Whether the characteristic is subscribed for notifications.
    pub fn is_subscribable(&self) -> bool {
        matches!(self, Self::HeartRateMeasurement | Self::Activity)
    }

    /// Whether updates of this characteristic are decoded.
    pub fn carries_readings(&self) -> bool {
        self.is_pollable() || self.is_subscribable()
    }

    /// Minimum payload length the decoder needs, if it decodes this characteristic.
    pub fn min_payload_len(&self) -> Option<usize> {
        match self {
            Self::DateTime => Some(7),
            Self::HeartRateMeasurement => Some(2),
            Self::Activity => Some(13),
            Self::Battery => Some(18),
            _ => None,
        }
    }
}

impl std::fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Commands written to the heart rate control point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorCommand {
    /// Start continuous heart rate monitoring.
    StartMonitoring,
    /// Stop continuous heart rate monitoring.
    StopMonitoring,
    /// Take a single heart rate measurement.
    StartSingleMeasurement,
    /// Stop a running single measurement.
    StopMeasurement,
}

impl MonitorCommand {
    /// The command's wire bytes.
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Self::StartMonitoring => &[0x15, 0x01, 0x01],
            Self::StopMonitoring => &[0x15, 0x01, 0x00],
            Self::StartSingleMeasurement => &[0x15, 0x02, 0x01],
            Self::StopMeasurement => &[0x15, 0x02, 0x00],
        }
    }
}

/// Vibration alert levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AlertMode {
    /// No alert.
    #[default]
    Off = 0x00,
    /// Message-style alert.
    Mild = 0x01,
    /// Call-style alert.
    High = 0x02,
}

impl AlertMode {
    /// The alert's wire byte.
    pub fn byte(&self) -> u8 {
        *self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_lookup_is_unique() {
        for id in CharacteristicId::ALL {
            assert_eq!(CharacteristicId::from_uuid(&id.uuid()), Some(id));
        }
    }

    #[test]
    fn test_unknown_uuid_not_recognized() {
        let battery_service = uuid_from_short(0x180f);
        assert_eq!(CharacteristicId::from_uuid(&battery_service), None);
        assert_eq!(CharacteristicId::from_wire_id("FEE0"), None);
    }

    #[test]
    fn test_from_wire_id() {
        assert_eq!(
            CharacteristicId::from_wire_id("2A2B"),
            Some(CharacteristicId::DateTime)
        );
        assert_eq!(
            CharacteristicId::from_wire_id("00000006-0000-3512-2118-0009AF100700"),
            Some(CharacteristicId::Battery)
        );
    }

    #[test]
    fn test_pollable_and_subscribable() {
        let pollable: Vec<_> = CharacteristicId::ALL
            .into_iter()
            .filter(CharacteristicId::is_pollable)
            .collect();
        assert_eq!(
            pollable,
            vec![
                CharacteristicId::DateTime,
                CharacteristicId::Activity,
                CharacteristicId::Battery
            ]
        );

        assert!(CharacteristicId::HeartRateMeasurement.is_subscribable());
        assert!(CharacteristicId::Activity.is_subscribable());
        assert!(!CharacteristicId::Battery.is_subscribable());
        assert!(!CharacteristicId::Alert.carries_readings());
        assert!(!CharacteristicId::HeartRateControlPoint.carries_readings());
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(MonitorCommand::StartMonitoring.bytes(), &[0x15, 0x01, 0x01]);
        assert_eq!(MonitorCommand::StopMonitoring.bytes(), &[0x15, 0x01, 0x00]);
        assert_eq!(
            MonitorCommand::StartSingleMeasurement.bytes(),
            &[0x15, 0x02, 0x01]
        );
        assert_eq!(MonitorCommand::StopMeasurement.bytes(), &[0x15, 0x02, 0x00]);
    }

    #[test]
    fn test_alert_bytes() {
        assert_eq!(AlertMode::Off.byte(), 0x00);
        assert_eq!(AlertMode::Mild.byte(), 0x01);
        assert_eq!(AlertMode::High.byte(), 0x02);
    }
}
