//! Civil-time helpers.
//!
//! Deadlines are civil dates: a task with deadline `d` is overdue once the
//! calendar day `d` has fully passed in the fixed civil timezone. All
//! conversions between civil readings and absolute instants go through the
//! helpers in this module so the timezone is applied in exactly one place.

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The calendar all civil dates and local datetimes are read in.
pub const CIVIL_TZ: Tz = chrono_tz::Europe::Oslo;

/// The civil date at `now`.
pub fn civil_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&CIVIL_TZ).date_naive()
}

/// Interpret a civil datetime in [`CIVIL_TZ`] and return the instant.
///
/// Ambiguous readings (the repeated hour at the DST fall-back) resolve to
/// the earlier instant; readings inside the spring-forward gap are shifted
/// past the gap.
pub fn civil_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    civil_to_fixed(local).with_timezone(&Utc)
}

/// Interpret a civil datetime in [`CIVIL_TZ`], keeping the local offset.
pub fn civil_to_fixed(local: NaiveDateTime) -> DateTime<FixedOffset> {
    let resolved = match CIVIL_TZ.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => CIVIL_TZ.from_utc_datetime(&local),
    };
    resolved.fixed_offset()
}

/// The last representable moment of a civil date, as an absolute timestamp
/// carrying the civil offset.
///
/// This is the instant a task with deadline `date` expires.
pub fn end_of_day(date: NaiveDate) -> DateTime<FixedOffset> {
    let last_moment = date
        .and_hms_nano_opt(23, 59, 59, 999_999_999)
        .unwrap_or(NaiveDateTime::MAX);
    civil_to_fixed(last_moment)
}
