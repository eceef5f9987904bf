//! Band clock readings.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};

/// A calendar timestamp as reported by the band.
///
/// The wire encoding carries year, month, day, hour, minute and second.
/// The weekday is derived from the calendar date and is `None` when the
/// band reports a date that does not exist (for example an unset clock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeReading {
    /// Calendar year.
    pub year: u16,
    /// Month (1-12).
    pub month: u8,
    /// Day of month (1-31).
    pub day: u8,
    /// Hour (0-23).
    pub hour: u8,
    /// Minute (0-59).
    pub minute: u8,
    /// Second (0-59).
    pub second: u8,
    /// Day of the week, if the date is valid.
    pub weekday: Option<Weekday>,
}

impl TimeReading {
    /// Create a reading from its wire fields.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let weekday = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
            .map(|date| date.weekday());

        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            weekday,
        }
    }

    /// Convert to a chrono datetime, if every field is in range.
    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )?
        .and_hms_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
        )
    }
}

impl std::fmt::Display for TimeReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekday_derived() {
        let time = TimeReading::new(2018, 4, 17, 8, 30, 0);
        assert_eq!(time.weekday, Some(Weekday::Tue));
    }

    #[test]
    fn test_invalid_date_has_no_weekday() {
        let time = TimeReading::new(2018, 2, 30, 0, 0, 0);
        assert_eq!(time.weekday, None);
        assert!(time.to_naive_datetime().is_none());
    }

    #[test]
    fn test_to_naive_datetime() {
        let time = TimeReading::new(2017, 11, 28, 14, 5, 9);
        let datetime = time.to_naive_datetime().unwrap();
        assert_eq!(datetime.to_string(), "2017-11-28 14:05:09");
    }

    #[test]
    fn test_display() {
        let time = TimeReading::new(2017, 1, 2, 3, 4, 5);
        assert_eq!(time.to_string(), "2017-01-02 03:04:05");
    }
}
