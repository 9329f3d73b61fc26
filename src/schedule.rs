use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Result, RosterError};
use crate::models::TaskDuration;

/// Largest accepted value for the hours part of a duration.
pub const MAX_DURATION_HOURS: u32 = 24;
/// Largest accepted value for the minutes part of a duration.
pub const MAX_DURATION_MINUTES: u32 = 59;
/// Days between the registration deadline and the start when none is given.
pub const DEFAULT_DEADLINE_LEAD_DAYS: i64 = 7;
/// Largest configurable lead time, ten years.
pub const MAX_DEADLINE_LEAD_DAYS: i64 = 3650;

/// Rejects hours above 24 or minutes above 59.
pub fn validate_duration(duration: &TaskDuration) -> Result<()> {
    if duration.hours > MAX_DURATION_HOURS {
        return Err(RosterError::Validation(format!(
            "Duration hours must be between 0 and {}, got {}",
            MAX_DURATION_HOURS, duration.hours
        )));
    }
    if duration.minutes > MAX_DURATION_MINUTES {
        return Err(RosterError::Validation(format!(
            "Duration minutes must be between 0 and {}, got {}",
            MAX_DURATION_MINUTES, duration.minutes
        )));
    }
    Ok(())
}

/// End of a task that starts at `start` and lasts `duration`.
///
/// Fails when the end falls outside the representable date range.
pub fn end_date(start: DateTime<Utc>, duration: &TaskDuration) -> Result<DateTime<Utc>> {
    Duration::try_minutes(duration.total_minutes())
        .and_then(|span| start.checked_add_signed(span))
        .ok_or_else(|| RosterError::Validation(format!("Start {} is too late to schedule", start.to_rfc3339())))
}

/// Whole hours and minutes between `start` and `end`.
///
/// Leftover seconds are dropped. Fails when `end` precedes `start` or the
/// span does not fit a valid duration.
pub fn duration_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TaskDuration> {
    let span = (end - start).num_minutes();
    if span < 0 {
        return Err(RosterError::Validation(format!(
            "End {} is before start {}",
            end.to_rfc3339(),
            start.to_rfc3339()
        )));
    }
    let duration = TaskDuration {
        hours: (span / 60) as u32,
        minutes: (span % 60) as u32,
    };
    validate_duration(&duration)?;
    Ok(duration)
}

/// Deadline `lead_days` before `start`.
pub fn default_deadline(start: DateTime<Utc>, lead_days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(lead_days)
        .and_then(|lead| start.checked_sub_signed(lead))
        .ok_or_else(|| {
            RosterError::Validation(format!(
                "No deadline {} days before {}; give one explicitly",
                lead_days,
                start.to_rfc3339()
            ))
        })
}

/// A registration deadline may be at the start but never after it.
pub fn validate_deadline(deadline: DateTime<Utc>, start: DateTime<Utc>) -> Result<()> {
    if deadline > start {
        return Err(RosterError::DeadlineAfterStart {
            deadline: deadline.to_rfc3339(),
            start: start.to_rfc3339(),
        });
    }
    Ok(())
}

/// Strictly past: a deadline equal to `now` has not passed yet.
pub fn deadline_passed(deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    deadline < now
}

/// Whether `instant` falls on `day` in the local time zone.
pub fn falls_on(instant: DateTime<Utc>, day: NaiveDate) -> bool {
    instant.with_timezone(&Local).date_naive() == day
}

/// Parses a user-entered local date/time.
///
/// Accepts `YYYY-MM-DD HH:MM`, `YYYY-MM-DDTHH:MM`, a bare `YYYY-MM-DD`
/// (midnight) or a full RFC 3339 timestamp.
pub fn parse_datetime(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| {
            RosterError::Validation(format!(
                "Invalid date '{}'. Use YYYY-MM-DD or YYYY-MM-DD HH:MM.",
                input
            ))
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| RosterError::Validation(format!("'{}' does not exist in the local time zone", input)))
}

/// Parses a calendar day `YYYY-MM-DD`.
pub fn parse_day(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|e| {
        RosterError::Validation(format!("Invalid date '{}': {}. Use YYYY-MM-DD.", input, e))
    })
}
