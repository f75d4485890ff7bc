//! Parsed, validated cron expressions.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use super::field::{DaysOfMonth, DaysOfWeek, Field, FieldKind};
use crate::error::{CadenceError, Result};

/// Years searched before an expression is declared unsatisfiable (one Gregorian cycle).
const SEARCH_HORIZON_YEARS: i32 = 400;

/// A cron schedule in `[second] minute hour day-of-month month day-of-week` form.
///
/// All evaluation happens in UTC. Five-field expressions fire at second zero.
/// When both day fields are restricted a day matches if *either* matches; when one
/// of them is unrestricted (`*`, `*/n` or `?`) both must match.
///
/// Equality and hashing use the normalized text, so `"0  *  * * *"` equals
/// `"0 * * * *"`.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use cadence_core::schedule::CronExpression;
///
/// let cron = CronExpression::parse("0 */5 * * * *").unwrap();
/// let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 30).unwrap();
/// assert_eq!(
///     cron.next_occurrence(from),
///     Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap())
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronExpression {
    text: String,
    has_seconds: bool,
    seconds: Field,
    minutes: Field,
    hours: Field,
    days_of_month: DaysOfMonth,
    months: Field,
    days_of_week: DaysOfWeek,
}

impl CronExpression {
    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    /// Parse and validate an expression.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidSchedule` error when the field count is not 5 or 6, or when
    /// any field violates the grammar.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        let normalized = parts.join(" ");

        let (has_seconds, second, [minute, hour, dom, month, dow]) = match parts.as_slice() {
            [minute, hour, dom, month, dow] => (false, None, [*minute, *hour, *dom, *month, *dow]),
            [second, minute, hour, dom, month, dow] => {
                (true, Some(*second), [*minute, *hour, *dom, *month, *dow])
            }
            _ => {
                return Err(CadenceError::invalid_schedule(
                    normalized,
                    format!("expected 5 or 6 fields, found {}", parts.len()),
                ))
            }
        };

        let invalid = |reason: String| CadenceError::invalid_schedule(normalized.clone(), reason);
        let seconds = match second {
            Some(text) => Field::parse(FieldKind::Second, text).map_err(invalid)?,
            None => Field::fixed(0),
        };

        Ok(Self {
            seconds,
            minutes: Field::parse(FieldKind::Minute, minute).map_err(invalid)?,
            hours: Field::parse(FieldKind::Hour, hour).map_err(invalid)?,
            days_of_month: DaysOfMonth::parse(dom).map_err(invalid)?,
            months: Field::parse(FieldKind::Month, month).map_err(invalid)?,
            days_of_week: DaysOfWeek::parse(dow).map_err(invalid)?,
            has_seconds,
            text: normalized,
        })
    }

    /// Every minute, at second zero.
    pub fn every_minute() -> Self {
        Self::preset("* * * * *")
    }

    /// Top of every hour.
    pub fn hourly() -> Self {
        Self::preset("0 * * * *")
    }

    /// Midnight UTC every day.
    pub fn daily() -> Self {
        Self::preset("0 0 * * *")
    }

    /// Midnight UTC every Sunday.
    pub fn weekly() -> Self {
        Self::preset("0 0 * * 0")
    }

    /// Midnight UTC on the first of every month.
    pub fn monthly() -> Self {
        Self::preset("0 0 1 * *")
    }

    fn preset(text: &'static str) -> Self {
        Self::parse(text).expect("Invalid preset cron expression")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// The normalized expression text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn to_text(&self) -> String {
        self.text.clone()
    }

    /// True for the six-field form.
    pub fn has_seconds(&self) -> bool {
        self.has_seconds
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Evaluation
    // ─────────────────────────────────────────────────────────────────────────

    /// True iff the instant (ignoring sub-second precision) satisfies every field.
    pub fn matches(&self, instant: DateTime<Utc>) -> bool {
        self.seconds.values.contains(instant.second())
            && self.minutes.values.contains(instant.minute())
            && self.hours.values.contains(instant.hour())
            && self.months.values.contains(instant.month())
            && self.day_matches(instant.date_naive())
    }

    /// Earliest instant strictly after `from` that satisfies the expression.
    ///
    /// Returns `None` only for expressions that can never fire (for example
    /// `0 0 30 2 *`), after searching a full 400-year cycle.
    pub fn next_occurrence(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = from.with_nanosecond(0)?.checked_add_signed(Duration::seconds(1))?;
        let horizon = start.year() + SEARCH_HORIZON_YEARS;

        let mut date = start.date_naive();
        let (mut hour, mut minute, mut second) = (start.hour(), start.minute(), start.second());

        loop {
            if date.year() > horizon {
                return None;
            }

            if !self.months.values.contains(date.month()) {
                date = match self.months.values.next_from(date.month() + 1) {
                    Some(month) => NaiveDate::from_ymd_opt(date.year(), month, 1)?,
                    None => NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?,
                };
                (hour, minute, second) = (0, 0, 0);
                continue;
            }

            if !self.day_matches(date) {
                date = date.succ_opt()?;
                (hour, minute, second) = (0, 0, 0);
                continue;
            }

            match self.hours.values.next_from(hour) {
                Some(next) if next == hour => {}
                Some(next) => (hour, minute, second) = (next, 0, 0),
                None => {
                    date = date.succ_opt()?;
                    (hour, minute, second) = (0, 0, 0);
                    continue;
                }
            }

            match self.minutes.values.next_from(minute) {
                Some(next) if next == minute => {}
                Some(next) => (minute, second) = (next, 0),
                None => {
                    (minute, second) = (0, 0);
                    hour += 1;
                    if hour > 23 {
                        hour = 0;
                        date = date.succ_opt()?;
                    }
                    continue;
                }
            }

            match self.seconds.values.next_from(second) {
                Some(next) => second = next,
                None => {
                    second = 0;
                    minute += 1;
                    if minute > 59 {
                        minute = 0;
                        hour += 1;
                        if hour > 23 {
                            hour = 0;
                            date = date.succ_opt()?;
                        }
                    }
                    continue;
                }
            }

            let naive = date.and_hms_opt(hour, minute, second)?;
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    /// The next `count` occurrences after `from`, stopping early if the expression
    /// runs out.
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut occurrences = Vec::with_capacity(count);
        let mut cursor = from;
        while occurrences.len() < count {
            match self.next_occurrence(cursor) {
                Some(next) => {
                    occurrences.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        occurrences
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.matches(date);
        let dow = self.days_of_week.matches(date);
        if self.days_of_month.unrestricted || self.days_of_week.unrestricted {
            dom && dow
        } else {
            dom || dow
        }
    }
}

impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for CronExpression {}

impl Hash for CronExpression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for CronExpression {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CronExpression {
    type Error = CadenceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CronExpression> for String {
    fn from(value: CronExpression) -> Self {
        value.text
    }
}
