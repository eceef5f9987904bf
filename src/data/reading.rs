//! Decoded domain events.

use super::{ActivityReading, BatteryReading, HeartRateReading, TimeReading};

/// A value decoded from a characteristic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reading {
    /// Current band time.
    Time(TimeReading),
    /// Heart rate notification.
    HeartRate(HeartRateReading),
    /// Activity counters.
    Activity(ActivityReading),
    /// Battery state.
    Battery(BatteryReading),
}

impl Reading {
    /// Get the heart rate reading, if this is one.
    pub fn as_heart_rate(&self) -> Option<HeartRateReading> {
        match self {
            Self::HeartRate(reading) => Some(*reading),
            _ => None,
        }
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Time(time) => write!(f, "Time: {}", time),
            Self::HeartRate(heart_rate) => write!(f, "Heart rate: {}", heart_rate),
            Self::Activity(activity) => write!(f, "Distance: {}", activity),
            Self::Battery(battery) => write!(f, "Battery: {}", battery),
        }
    }
}
