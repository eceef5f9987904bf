//! Battery level readings.

use super::TimeReading;

/// Battery state of the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryReading {
    /// Charge level in percent.
    pub percentage: u8,
    /// When the band was last charged.
    pub last_charged_at: TimeReading,
}

impl BatteryReading {
    /// Battery level at or below which the band is considered low.
    pub const LOW_THRESHOLD: u8 = 10;

    /// Check if the battery is low.
    pub fn is_low(&self) -> bool {
        self.percentage <= Self::LOW_THRESHOLD
    }
}

impl std::fmt::Display for BatteryReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} %, charged: {}", self.percentage, self.last_charged_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_low() {
        let charged = TimeReading::new(2018, 1, 1, 0, 0, 0);
        let low = BatteryReading {
            percentage: 5,
            last_charged_at: charged,
        };
        let full = BatteryReading {
            percentage: 100,
            last_charged_at: charged,
        };
        assert!(low.is_low());
        assert!(!full.is_low());
        assert_eq!(full.to_string(), "100 %, charged: 2018-01-01 00:00:00");
    }
}
