//! Calendar-day bucketing.
//!
//! All history queries and the streak logic group meals by *local* calendar
//! day: a half-open window `[local midnight, local midnight + 24h)` around a
//! timestamp. The zone is picked once at startup and threaded through state
//! so every component buckets identically.

use chrono::{FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Utc};

pub const MS_PER_DAY: i64 = 86_400_000;

/// Timezone used for day bucketing: a fixed UTC offset pinned via
/// configuration (deterministic, useful in tests and single-user
/// deployments), or the host's local zone.
#[derive(Debug, Clone, Copy)]
pub enum DayZone {
    Fixed(FixedOffset),
    HostLocal,
}

impl DayZone {
    /// `Some(minutes)` pins a fixed offset east of UTC; `None` uses the host zone.
    pub fn from_offset_minutes(offset_minutes: Option<i32>) -> anyhow::Result<Self> {
        match offset_minutes {
            Some(minutes) => {
                let offset = minutes
                    .checked_mul(60)
                    .and_then(FixedOffset::east_opt)
                    .ok_or_else(|| {
                        anyhow::anyhow!("TIME_OFFSET_MINUTES out of range: {minutes}")
                    })?;
                Ok(DayZone::Fixed(offset))
            }
            None => Ok(DayZone::HostLocal),
        }
    }
}

/// Current wall-clock instant as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Start of the calendar day containing `ts_ms`, as epoch milliseconds.
/// Applying this twice is a fixed point: the midnight of a midnight is itself.
pub fn local_midnight_ms(zone: DayZone, ts_ms: i64) -> i64 {
    match zone {
        DayZone::Fixed(offset) => midnight_in(&offset, ts_ms),
        DayZone::HostLocal => midnight_in(&Local, ts_ms),
    }
}

/// Half-open window `[midnight, midnight + 24h)` for the day containing `ts_ms`.
pub fn day_bounds_ms(zone: DayZone, ts_ms: i64) -> (i64, i64) {
    let start = local_midnight_ms(zone, ts_ms);
    (start, start + MS_PER_DAY)
}

/// Window for a `YYYY-MM-DD` date string interpreted in the bucketing zone.
/// Returns `None` for unparseable input.
pub fn parse_local_date(zone: DayZone, date: &str) -> Option<(i64, i64)> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let start = match zone {
        DayZone::Fixed(offset) => wall_midnight_ms(&offset, date)?,
        DayZone::HostLocal => wall_midnight_ms(&Local, date)?,
    };
    Some((start, start + MS_PER_DAY))
}

fn midnight_in<Tz: TimeZone>(tz: &Tz, ts_ms: i64) -> i64 {
    let Some(instant) = tz.timestamp_millis_opt(ts_ms).earliest() else {
        // Instant not representable in this zone; fall back to UTC days.
        return utc_midnight_ms(ts_ms);
    };
    wall_midnight_ms(tz, instant.date_naive()).unwrap_or_else(|| utc_midnight_ms(ts_ms))
}

/// Epoch ms of `date`'s 00:00 wall time in `tz`. `None` when the zone skips
/// midnight that day (DST transition at 00:00).
fn wall_midnight_ms<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<i64> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

fn utc_midnight_ms(ts_ms: i64) -> i64 {
    ts_ms - ts_ms.rem_euclid(MS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plus_two() -> DayZone {
        DayZone::Fixed(FixedOffset::east_opt(2 * 3600).unwrap())
    }

    fn minus_five() -> DayZone {
        DayZone::Fixed(FixedOffset::west_opt(5 * 3600).unwrap())
    }

    fn ms_at(zone: DayZone, y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        let DayZone::Fixed(offset) = zone else {
            panic!("tests use fixed offsets only");
        };
        offset
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn midnight_of_an_afternoon_is_start_of_that_day() {
        let zone = plus_two();
        let afternoon = ms_at(zone, 2024, 5, 5, 13, 45, 10);
        assert_eq!(
            local_midnight_ms(zone, afternoon),
            ms_at(zone, 2024, 5, 5, 0, 0, 0)
        );
    }

    #[test]
    fn instant_before_local_midnight_buckets_to_previous_day() {
        let zone = plus_two();
        let late = ms_at(zone, 2024, 5, 4, 23, 59, 59);
        assert_eq!(
            local_midnight_ms(zone, late),
            ms_at(zone, 2024, 5, 4, 0, 0, 0)
        );
    }

    #[test]
    fn negative_offset_shifts_the_day_boundary() {
        let zone = minus_five();
        // 03:00 UTC on Jan 2 is still Jan 1 at UTC-5.
        let ts = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 0, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(
            local_midnight_ms(zone, ts),
            ms_at(zone, 2024, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn midnight_is_a_fixed_point() {
        let zone = plus_two();
        let midnight = ms_at(zone, 2024, 5, 5, 0, 0, 0);
        assert_eq!(local_midnight_ms(zone, midnight), midnight);
    }

    #[test]
    fn day_bounds_are_half_open_and_one_day_wide() {
        let zone = plus_two();
        let ts = ms_at(zone, 2024, 5, 5, 8, 0, 0);
        let (start, end) = day_bounds_ms(zone, ts);
        assert_eq!(end - start, MS_PER_DAY);
        assert!(start <= ts && ts < end);
        // The instant exactly at `end` belongs to the next day.
        assert_eq!(local_midnight_ms(zone, end), end);
    }

    #[test]
    fn parse_local_date_matches_day_bounds() {
        let zone = plus_two();
        let ts = ms_at(zone, 2024, 5, 5, 17, 30, 0);
        assert_eq!(
            parse_local_date(zone, "2024-05-05"),
            Some(day_bounds_ms(zone, ts))
        );
    }

    #[test]
    fn parse_local_date_rejects_other_formats() {
        let zone = plus_two();
        assert_eq!(parse_local_date(zone, "05/05/2024"), None);
        assert_eq!(parse_local_date(zone, "2024-13-01"), None);
        assert_eq!(parse_local_date(zone, "yesterday"), None);
    }

    #[test]
    fn offset_minutes_round_trip() {
        assert!(matches!(
            DayZone::from_offset_minutes(Some(120)),
            Ok(DayZone::Fixed(_))
        ));
        assert!(matches!(
            DayZone::from_offset_minutes(None),
            Ok(DayZone::HostLocal)
        ));
        assert!(DayZone::from_offset_minutes(Some(100_000)).is_err());
    }
}
