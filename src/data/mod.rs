//! Data structures for band readings.
//!
//! These are the typed values decoded from raw characteristic payloads:
//! clock time, activity counters, battery state and heart rate.

pub mod activity;
pub mod battery;
pub mod heart_rate;
pub mod reading;
pub mod time;

pub use activity::ActivityReading;
pub use battery::BatteryReading;
pub use heart_rate::HeartRateReading;
pub use reading::Reading;
pub use time::TimeReading;
