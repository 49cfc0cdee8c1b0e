//! Local calendar days. Timestamps are stored as naive UTC; every "day"
//! the engines see is a day in the configured zone.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

pub fn local_day(tz: &Tz, at: NaiveDateTime) -> NaiveDate {
    tz.from_utc_datetime(&at).date_naive()
}

pub fn today(tz: &Tz) -> NaiveDate {
    local_day(tz, Utc::now().naive_utc())
}

/// UTC instant at which `day` begins locally.
pub fn day_start_utc(tz: &Tz, day: NaiveDate) -> NaiveDateTime {
    let midnight = day.and_time(NaiveTime::MIN);
    if let Some(dt) = tz.from_local_datetime(&midnight).earliest() {
        return dt.naive_utc();
    }
    // Midnight skipped by a DST jump.
    let later = midnight + TimeDelta::hours(1);
    tz.from_local_datetime(&later)
        .earliest()
        .map(|dt| dt.naive_utc())
        .unwrap_or(later)
}

/// Half-open UTC range covering local days `first..=last`.
pub fn utc_range(tz: &Tz, first: NaiveDate, last: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let after = last.checked_add_days(Days::new(1)).unwrap_or(last);
    (day_start_utc(tz, first), day_start_utc(tz, after))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn local_day_crosses_midnight_east_of_utc() {
        let tz: Tz = "Europe/Warsaw".parse().unwrap();
        let at = d(2024, 1, 1).and_hms_opt(23, 30, 0).unwrap();
        assert_eq!(local_day(&tz, at), d(2024, 1, 2));
        assert_eq!(local_day(&chrono_tz::UTC, at), d(2024, 1, 1));
    }

    #[test]
    fn range_is_half_open_over_local_days() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let (from, to) = utc_range(&tz, d(2024, 7, 1), d(2024, 7, 1));
        assert_eq!(from, d(2024, 7, 1).and_hms_opt(4, 0, 0).unwrap());
        assert_eq!(to, d(2024, 7, 2).and_hms_opt(4, 0, 0).unwrap());
    }

    #[test]
    fn dst_gap_at_midnight_still_yields_a_start() {
        // Chile skips 00:00 -> 01:00 in early September.
        let tz: Tz = "America/Santiago".parse().unwrap();
        let start = day_start_utc(&tz, d(2024, 9, 8));
        assert_eq!(local_day(&tz, start), d(2024, 9, 8));
    }
}
