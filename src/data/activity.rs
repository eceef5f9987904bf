//! Step, distance and calorie counters.

/// Daily activity counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActivityReading {
    /// Steps walked today.
    pub steps: u32,
    /// Distance walked today, in meters.
    pub meters: u32,
    /// Calories burned today, in kcal.
    pub calories: u32,
}

impl ActivityReading {
    /// Distance in kilometers.
    pub fn kilometers(&self) -> f64 {
        f64::from(self.meters) / 1000.0
    }
}

impl std::fmt::Display for ActivityReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} steps, {} m, {} kcal",
            self.steps, self.meters, self.calories
        )
    }
}
