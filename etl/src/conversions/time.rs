use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Interprets a naive source timestamp in the source time zone. No zone means UTC.
pub fn localize(naive: NaiveDateTime, time_zone: Option<FixedOffset>) -> DateTime<Utc> {
    match time_zone {
        Some(offset) => (naive - offset).and_utc(),
        None => Utc.from_utc_datetime(&naive),
    }
}

/// Renders an instant as the wall-clock time the source stores it as.
pub fn to_source_local(instant: DateTime<Utc>, time_zone: Option<FixedOffset>) -> NaiveDateTime {
    match time_zone {
        Some(offset) => instant.with_timezone(&offset).naive_local(),
        None => instant.naive_utc(),
    }
}

/// Converts epoch milliseconds, as returned by index aggregates on date fields, into an instant.
pub fn from_epoch_millis(millis: f64) -> EtlResult<DateTime<Utc>> {
    if !millis.is_finite() {
        bail!(
            ErrorKind::ConversionError,
            "Epoch milliseconds are not finite",
            millis
        );
    }

    match DateTime::from_timestamp_millis(millis.round() as i64) {
        Some(instant) => Ok(instant),
        None => bail!(
            ErrorKind::ConversionError,
            "Epoch milliseconds out of range",
            millis
        ),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn naive(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn localize_and_back_is_lossless() {
        let offset = FixedOffset::east_opt(2 * 3600);
        let instant = localize(naive(12, 0), offset);

        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 5, 10, 10, 0, 0).unwrap());
        assert_eq!(to_source_local(instant, offset), naive(12, 0));
    }

    #[test]
    fn missing_zone_means_utc() {
        let instant = localize(naive(8, 30), None);
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 5, 10, 8, 30, 0).unwrap());
        assert_eq!(to_source_local(instant, None), naive(8, 30));
    }

    #[test]
    fn epoch_millis_convert_to_instants() {
        let instant = from_epoch_millis(1_715_335_200_000.0).unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 5, 10, 10, 0, 0).unwrap());
        assert!(from_epoch_millis(f64::NAN).is_err());
    }
}
