//! Heart rate readings.

/// A heart rate sample from the band.
///
/// The band reports `0` while it has no lock on a pulse; such readings are
/// decoded but are not real measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeartRateReading {
    /// Beats per minute.
    pub bpm: u8,
}

impl HeartRateReading {
    /// Create a new reading.
    pub fn new(bpm: u8) -> Self {
        Self { bpm }
    }

    /// Check if this reading carries an actual measurement.
    pub fn is_measurement(&self) -> bool {
        self.bpm > 0
    }
}

impl std::fmt::Display for HeartRateReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} BPM", self.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_measurement() {
        assert!(!HeartRateReading::new(0).is_measurement());
        assert!(HeartRateReading::new(72).is_measurement());
    }
}
