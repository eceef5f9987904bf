//! Characteristic payload decoding.
//!
//! Turns the raw bytes of a characteristic update into a typed [`Reading`].
//! Offsets are fixed by the band firmware:
//!
//! | Characteristic | Layout |
//! |---|---|
//! | DateTime | bytes 0-6: timestamp |
//! | HeartRateMeasurement | byte 0: flags, byte 1: BPM |
//! | Activity | byte 0: flags, bytes 1-4: steps, 5-8: meters, 9-12: kcal |
//! | Battery | byte 1: percent, bytes 11-17: last charge timestamp |

use crate::data::{ActivityReading, BatteryReading, HeartRateReading, Reading};
use crate::error::DecodeError;
use crate::protocol::catalog::CharacteristicId;
use crate::protocol::codec::{decode_timestamp, decode_u32_le, decode_u8, field, TIMESTAMP_LEN};

const BATTERY_LEVEL_OFFSET: usize = 1;
const BATTERY_LAST_CHARGE_OFFSET: usize = 11;
const HEART_RATE_OFFSET: usize = 1;
const STEPS_OFFSET: usize = 1;
const METERS_OFFSET: usize = 5;
const CALORIES_OFFSET: usize = 9;

/// Decode a characteristic payload.
///
/// Returns `Ok(None)` for recognized characteristics that carry no modeled
/// payload.
pub fn decode(id: CharacteristicId, bytes: &[u8]) -> Result<Option<Reading>, DecodeError> {
    let reading = match id {
        CharacteristicId::DateTime => Reading::Time(decode_timestamp(bytes)?),
        CharacteristicId::HeartRateMeasurement => {
            Reading::HeartRate(HeartRateReading::new(decode_u8(bytes, HEART_RATE_OFFSET)?))
        }
        CharacteristicId::Activity => Reading::Activity(decode_activity(bytes)?),
        CharacteristicId::Battery => Reading::Battery(decode_battery(bytes)?),
        _ => return Ok(None),
    };

    Ok(Some(reading))
}

fn decode_activity(bytes: &[u8]) -> Result<ActivityReading, DecodeError> {
    // Check the full length first so a short payload reports the real requirement.
    field(bytes, 0, CALORIES_OFFSET + 4)?;

    Ok(ActivityReading {
        steps: decode_u32_le(&bytes[STEPS_OFFSET..])?,
        meters: decode_u32_le(&bytes[METERS_OFFSET..])?,
        calories: decode_u32_le(&bytes[CALORIES_OFFSET..])?,
    })
}

fn decode_battery(bytes: &[u8]) -> Result<BatteryReading, DecodeError> {
    let last_charge = field(bytes, BATTERY_LAST_CHARGE_OFFSET, TIMESTAMP_LEN)?;

    Ok(BatteryReading {
        percentage: decode_u8(bytes, BATTERY_LEVEL_OFFSET)?,
        last_charged_at: decode_timestamp(last_charge)?,
    })
}
