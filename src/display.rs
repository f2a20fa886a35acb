//! Display formatting for status fields.
//!
//! Views show every numeric field as text. Floating-point readbacks are rendered the
//! way the beamline GUIs always have (`2.0`, `1.0E-4`), and EPICS timestamps are turned
//! into local calendar times.
//!
//! # EPICS epoch
//!
//! EPICS time stamps count seconds from 1990-01-01 00:00:00 UTC. Converting to the Unix
//! epoch adds the fixed [`EPICS_EPOCH_OFFSET_SECS`].

use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt::Display;

use crate::error::{AppResult, StatusError};

/// Seconds between the Unix epoch (1970-01-01) and the EPICS epoch (1990-01-01).
pub const EPICS_EPOCH_OFFSET_SECS: f64 = 631_152_000.0;

/// `dd/MM/yy hh:mm:ss.SSS`, 12-hour clock without a meridiem marker.
const TIMESTAMP_FORMAT: &str = "%d/%m/%y %I:%M:%S%.3f";

/// Render a floating-point value for display.
///
/// Magnitudes in `[1e-3, 1e7)` are plain decimals that always carry a fractional part
/// (`2.0`, `0.125`). Anything else uses scientific notation with an upper-case `E`
/// (`1.0E-4`, `1.5E10`).
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        // Debug formatting keeps the trailing ".0" on integral values
        return format!("{value:?}");
    }

    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    if mantissa.contains('.') {
        format!("{mantissa}E{exponent}")
    } else {
        format!("{mantissa}.0E{exponent}")
    }
}

/// Render an integer field for display.
pub fn format_int(value: i32) -> String {
    value.to_string()
}

/// Convert EPICS epoch seconds to whole milliseconds since the Unix epoch.
///
/// The fractional millisecond is truncated toward zero.
pub fn epics_to_unix_millis(epoch: f64) -> AppResult<i64> {
    let millis = (epoch + EPICS_EPOCH_OFFSET_SECS) * 1000.0;
    if !millis.is_finite() || millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return Err(StatusError::InvalidTimestamp(epoch));
    }
    Ok(millis.trunc() as i64)
}

/// Convert a calendar instant to EPICS epoch seconds.
pub fn to_epics_epoch(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_millis() as f64 / 1000.0 - EPICS_EPOCH_OFFSET_SECS
}

/// Current time in EPICS epoch seconds.
pub fn epics_now() -> f64 {
    to_epics_epoch(Utc::now())
}

/// Format an EPICS epoch timestamp in the local time zone.
pub fn format_epics_timestamp(epoch: f64) -> AppResult<String> {
    format_epics_timestamp_in(epoch, &Local)
}

/// Format an EPICS epoch timestamp in an explicit time zone.
pub fn format_epics_timestamp_in<Tz>(epoch: f64, tz: &Tz) -> AppResult<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let millis = epics_to_unix_millis(epoch)?;
    let instant = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or(StatusError::InvalidTimestamp(epoch))?;
    Ok(instant
        .with_timezone(tz)
        .format(TIMESTAMP_FORMAT)
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_format_double_decimal_range() {
        assert_eq!(format_double(2.0), "2.0");
        assert_eq!(format_double(0.5), "0.5");
        assert_eq!(format_double(-12.25), "-12.25");
        assert_eq!(format_double(0.001), "0.001");
        assert_eq!(format_double(1234567.5), "1234567.5");
        assert_eq!(format_double(0.0), "0.0");
        assert_eq!(format_double(-0.0), "-0.0");
    }

    #[test]
    fn test_format_double_scientific_range() {
        assert_eq!(format_double(1e-4), "1.0E-4");
        assert_eq!(format_double(2.5e-5), "2.5E-5");
        assert_eq!(format_double(1e7), "1.0E7");
        assert_eq!(format_double(1.5e10), "1.5E10");
        assert_eq!(format_double(-3e8), "-3.0E8");
    }

    #[test]
    fn test_format_double_non_finite() {
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::INFINITY), "Infinity");
        assert_eq!(format_double(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_format_int() {
        assert_eq!(format_int(0), "0");
        assert_eq!(format_int(-42), "-42");
        assert_eq!(format_int(2048), "2048");
    }

    #[test]
    fn test_epics_epoch_origin() {
        assert_eq!(epics_to_unix_millis(0.0).unwrap(), 631_152_000_000);
        assert_eq!(
            format_epics_timestamp_in(0.0, &Utc).unwrap(),
            "01/01/90 12:00:00.000"
        );
    }

    #[test]
    fn test_timestamp_uses_twelve_hour_clock() {
        let epoch = 13.0 * 3600.0 + 0.5;
        assert_eq!(
            format_epics_timestamp_in(epoch, &Utc).unwrap(),
            "01/01/90 01:00:00.500"
        );
    }

    #[test]
    fn test_timestamp_matches_unix_millis() {
        let epoch = 1_000_000_000.25;
        let millis = epics_to_unix_millis(epoch).unwrap();
        assert_eq!(millis, 1_631_152_000_250);

        let expected = DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap()
            .format("%d/%m/%y %I:%M:%S%.3f")
            .to_string();
        assert_eq!(format_epics_timestamp_in(epoch, &Utc).unwrap(), expected);
        assert_eq!(expected, "09/09/21 01:46:40.250");
    }

    #[test]
    fn test_timestamp_before_epics_epoch() {
        assert_eq!(
            format_epics_timestamp_in(-0.5, &Utc).unwrap(),
            "31/12/89 11:59:59.500"
        );
    }

    #[test]
    fn test_timestamp_respects_time_zone() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(
            format_epics_timestamp_in(0.0, &cet).unwrap(),
            "01/01/90 01:00:00.000"
        );
    }

    #[test]
    fn test_invalid_timestamps_rejected() {
        assert!(matches!(
            format_epics_timestamp(f64::NAN),
            Err(StatusError::InvalidTimestamp(_))
        ));
        assert!(format_epics_timestamp(f64::INFINITY).is_err());
        assert!(format_epics_timestamp(1e300).is_err());
    }

    #[test]
    fn test_epics_epoch_conversion_inverse() {
        let instant = DateTime::<Utc>::from_timestamp_millis(1_631_152_000_250).unwrap();
        assert_eq!(to_epics_epoch(instant), 1_000_000_000.25);
    }
}
