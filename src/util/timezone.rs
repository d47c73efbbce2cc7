use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use time::{Date, Duration, Month, OffsetDateTime, UtcOffset};

pub fn localized_datetime(time: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = time.to_offset(UtcOffset::UTC);
    let seconds = utc.unix_timestamp();
    let nanos: u32 = utc.nanosecond();
    let datetime_utc = DateTime::<Utc>::from_timestamp(seconds, nanos)
        .or_else(|| DateTime::<Utc>::from_timestamp(seconds, 0))
        .unwrap_or_default();
    tz.from_utc_datetime(&datetime_utc.naive_utc())
}

pub fn localized_date(time: OffsetDateTime, tz: Tz) -> Date {
    let localized = localized_datetime(time, tz);
    let month = Month::try_from(localized.month() as u8).unwrap_or(Month::January);
    let day = u8::try_from(localized.day()).unwrap_or(1);
    Date::from_calendar_date(localized.year(), month, day).unwrap_or(time.date())
}

/// The instant local midnight begins on `date` in `tz`.
///
/// When midnight falls into a DST gap the first valid instant after it is used.
pub fn start_of_local_day(date: Date, tz: Tz) -> OffsetDateTime {
    let fallback = date.midnight().assume_utc();
    let Some(naive) = NaiveDate::from_ymd_opt(date.year(), u8::from(date.month()).into(), date.day().into())
        .and_then(|day| day.and_hms_opt(0, 0, 0))
    else {
        return fallback;
    };

    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + chrono::Duration::hours(1))).earliest());

    local
        .and_then(|instant| OffsetDateTime::from_unix_timestamp(instant.timestamp()).ok())
        .unwrap_or(fallback)
}

/// Monday of the ISO week containing `date`.
pub fn start_of_week(date: Date) -> Date {
    let back = i64::from(date.weekday().number_days_from_monday());
    date.checked_sub(Duration::days(back)).unwrap_or(date)
}

pub fn start_of_month(date: Date) -> Date {
    date.replace_day(1).unwrap_or(date)
}

pub fn start_of_next_month(date: Date) -> Date {
    let first = start_of_month(date);
    let (year, month) = match first.month() {
        Month::December => (first.year() + 1, Month::January),
        other => (first.year(), other.next()),
    };
    Date::from_calendar_date(year, month, 1).unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;

    #[test]
    fn localized_date_crosses_midnight() {
        let instant = datetime!(2026-03-01 23:30 UTC);
        assert_eq!(localized_date(instant, Tz::UTC), date!(2026 - 03 - 01));
        assert_eq!(localized_date(instant, Tz::Asia__Tokyo), date!(2026 - 03 - 02));
    }

    #[test]
    fn local_midnight_in_offset_zone() {
        let start = start_of_local_day(date!(2026 - 10 - 19), Tz::Asia__Tokyo);
        assert_eq!(start, datetime!(2026-10-18 15:00 UTC));
    }

    #[test]
    fn week_and_month_starts() {
        // 2026-10-19 is a Monday.
        assert_eq!(start_of_week(date!(2026 - 10 - 22)), date!(2026 - 10 - 19));
        assert_eq!(start_of_week(date!(2026 - 10 - 19)), date!(2026 - 10 - 19));
        assert_eq!(start_of_month(date!(2026 - 10 - 22)), date!(2026 - 10 - 01));
        assert_eq!(start_of_next_month(date!(2026 - 12 - 31)), date!(2027 - 01 - 01));
    }
}
