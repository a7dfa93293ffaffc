//! Stateless checks shared by the producer and the planner.

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::error::{DeadlineViolation, Result, TaskError};
use crate::types::TaskField;

/// Depth ceiling of a task tree; the root sits at depth 1.
pub const MAX_DEPTH: u32 = 5;

pub const TITLE_MAX_LEN: usize = 200;
pub const DESCRIPTION_MAX_LEN: usize = 2000;

/// Last calendar year a stored timestamp can carry; RFC 3339 has four year digits.
pub const MAX_DEADLINE_YEAR: i32 = 9999;

/// Normalise `candidate` to UTC and require it to be strictly after `now`
/// and no later than the end of [`MAX_DEADLINE_YEAR`].
pub fn validate_deadline_in_future<Tz: TimeZone>(
    candidate: &DateTime<Tz>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let candidate = candidate.with_timezone(&Utc);
    if candidate <= now {
        return Err(TaskError::InvalidDeadline(DeadlineViolation::NotInFuture));
    }
    if candidate.year() > MAX_DEADLINE_YEAR {
        return Err(TaskError::InvalidDeadline(DeadlineViolation::OutOfRange));
    }
    Ok(candidate)
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(TaskError::EmptyTitle);
    }
    check_len(TaskField::Title, title, TITLE_MAX_LEN)
}

/// Empty descriptions are fine; only the length is bounded.
pub fn validate_description(description: &str) -> Result<()> {
    check_len(TaskField::Description, description, DESCRIPTION_MAX_LEN)
}

fn check_len(field: TaskField, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(TaskError::TextTooLong { field, len, max });
    }
    Ok(())
}
