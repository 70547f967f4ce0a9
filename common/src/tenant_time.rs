use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::clock::Clock;

/// A calendar date in the tenant's zone, stored the way this system stores
/// every calendar date: a plain `YYYY-MM-DD` wall-clock day with no attached
/// instant until one is explicitly constructed via `TenantClock::local_datetime_at`.
pub type CalendarDate = NaiveDate;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("local time {date} {hour:02}:{minute:02} is not a single unambiguous instant in zone {zone}: {reason}")]
    AmbiguousOrInvalidLocalTime {
        date: NaiveDate,
        hour: u32,
        minute: u32,
        zone: String,
        reason: &'static str,
    },
}

/// Tenant-local wall-clock service. One instance per organization's configured
/// zone; every scheduling deadline in the system is computed through this,
/// never by comparing a UTC instant to a partial wall-clock string directly.
pub struct TenantClock<C: Clock> {
    zone: Tz,
    clock: C,
}

impl<C: Clock> TenantClock<C> {
    pub fn new(zone: Tz, clock: C) -> Self {
        Self { zone, clock }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Current instant, UTC internally.
    pub fn now_local(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Today's calendar date in the tenant zone.
    pub fn today_in_zone(&self) -> CalendarDate {
        self.now_local().with_timezone(&self.zone).date_naive()
    }

    /// The instant corresponding to wall-clock `h:m` on `date` in the tenant
    /// zone. DST transitions can make a given local time ambiguous (two
    /// instants map to it, during a fall-back) or nonexistent (a spring-forward
    /// gap swallows it); `from_local_datetime(..).single()` is `None` in both
    /// cases, and this function refuses to guess — callers get a descriptive
    /// policy error instead of a silently-picked instant.
    pub fn local_datetime_at(
        &self,
        date: CalendarDate,
        hour: u32,
        minute: u32,
    ) -> Result<DateTime<Utc>, TimeError> {
        let naive_time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or(
            TimeError::AmbiguousOrInvalidLocalTime {
                date,
                hour,
                minute,
                zone: self.zone.to_string(),
                reason: "hour/minute out of range",
            },
        )?;
        let naive = date.and_time(naive_time);
        match self.zone.from_local_datetime(&naive).single() {
            Some(local) => Ok(local.with_timezone(&Utc)),
            None => Err(TimeError::AmbiguousOrInvalidLocalTime {
                date,
                hour,
                minute,
                zone: self.zone.to_string(),
                reason: "DST gap or ambiguity for this local time",
            }),
        }
    }

    /// End-of-day instant (23:59:59 local) on `date`, used for windows that
    /// close "end of today" rather than at a fixed hour.
    pub fn end_of_day(&self, date: CalendarDate) -> Result<DateTime<Utc>, TimeError> {
        self.local_datetime_at(date, 23, 59)
    }

    pub fn add_days(date: CalendarDate, n: i64) -> CalendarDate {
        if n >= 0 {
            date.checked_add_days(Days::new(n as u64))
                .unwrap_or(date)
        } else {
            date.checked_sub_days(Days::new((-n) as u64))
                .unwrap_or(date)
        }
    }

    /// 0=Sunday..6=Saturday, matching the driver-preference day encoding.
    pub fn day_of_week(date: CalendarDate) -> u32 {
        date.weekday().num_days_from_sunday()
    }

    /// Monday-anchored week start containing `date`.
    pub fn week_start(date: CalendarDate) -> CalendarDate {
        let from_monday = date.weekday().num_days_from_monday();
        Self::add_days(date, -(from_monday as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn toronto_clock() -> TenantClock<FixedClock> {
        let now = "2026-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        TenantClock::new(chrono_tz::America::Toronto, FixedClock::new(now))
    }

    #[test]
    fn local_datetime_at_is_stable_across_dst() {
        let tc = toronto_clock();
        // Jan 15 is EST (UTC-5): 07:00 local -> 12:00 UTC.
        let winter = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let instant = tc.local_datetime_at(winter, 7, 0).unwrap();
        assert_eq!(instant.to_rfc3339(), "2026-01-15T12:00:00+00:00");

        // Jul 15 is EDT (UTC-4): 07:00 local -> 11:00 UTC.
        let summer = NaiveDate::from_ymd_opt(2026, 7, 15).unwrap();
        let instant = tc.local_datetime_at(summer, 7, 0).unwrap();
        assert_eq!(instant.to_rfc3339(), "2026-07-15T11:00:00+00:00");
    }

    #[test]
    fn spring_forward_gap_is_rejected() {
        let tc = toronto_clock();
        // 2026-03-08 02:30 local does not exist in America/Toronto (clocks
        // jump 02:00 -> 03:00).
        let gap_date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let err = tc.local_datetime_at(gap_date, 2, 30).unwrap_err();
        assert!(matches!(err, TimeError::AmbiguousOrInvalidLocalTime { .. }));
    }

    #[test]
    fn week_start_anchors_to_monday() {
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        assert_eq!(
            TenantClock::<FixedClock>::week_start(sunday),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
        let wednesday = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        assert_eq!(
            TenantClock::<FixedClock>::week_start(wednesday),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
    }

    #[test]
    fn day_of_week_matches_sunday_zero_encoding() {
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        assert_eq!(TenantClock::<FixedClock>::day_of_week(sunday), 0);
        let monday = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(TenantClock::<FixedClock>::day_of_week(monday), 1);
    }
}
