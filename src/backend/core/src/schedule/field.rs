//! Per-field cron grammar.
//!
//! Every field compiles to a bitmask of allowed values. Day-of-month and day-of-week
//! additionally carry the calendar-relative specials (`L`, `W`, `#`) that cannot be
//! expressed as a fixed set.

use chrono::{Datelike, NaiveDate};

/// Which position a field occupies in the expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Second,
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

impl FieldKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::DayOfMonth => "day-of-month",
            Self::Month => "month",
            Self::DayOfWeek => "day-of-week",
        }
    }

    fn bounds(self) -> (u32, u32) {
        match self {
            Self::Second | Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::DayOfMonth => (1, 31),
            Self::Month => (1, 12),
            // 7 is accepted as an alias for Sunday
            Self::DayOfWeek => (0, 7),
        }
    }

    fn parse_value(self, token: &str) -> Result<u32, String> {
        let names: &[&str] = match self {
            Self::Month => &MONTH_NAMES,
            Self::DayOfWeek => &WEEKDAY_NAMES,
            _ => &[],
        };
        if let Some(index) = names.iter().position(|n| n.eq_ignore_ascii_case(token)) {
            let offset = if self == Self::Month { 1 } else { 0 };
            return Ok(index as u32 + offset);
        }

        let value: u32 = token
            .parse()
            .map_err(|_| format!("'{}' is not a valid {} value", token, self.name()))?;
        let (min, max) = self.bounds();
        if value < min || value > max {
            return Err(format!(
                "{} value {} out of range {}-{}",
                self.name(),
                value,
                min,
                max
            ));
        }
        Ok(value)
    }
}

/// Set of allowed values for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ValueSet {
    bits: u64,
}

impl ValueSet {
    pub(crate) fn single(value: u32) -> Self {
        Self { bits: 1 << value }
    }

    fn insert(&mut self, value: u32) {
        self.bits |= 1 << value;
    }

    pub(crate) fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1 << value) != 0
    }

    /// Smallest member that is `>= value`.
    pub(crate) fn next_from(&self, value: u32) -> Option<u32> {
        if value >= 64 {
            return None;
        }
        let masked = self.bits & (u64::MAX << value);
        (masked != 0).then(|| masked.trailing_zeros())
    }

    fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

/// A plain numeric field (seconds, minutes, hours, months).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Field {
    pub(crate) values: ValueSet,
}

impl Field {
    pub(crate) fn parse(kind: FieldKind, text: &str) -> Result<Self, String> {
        let mut values = ValueSet::default();
        for item in text.split(',') {
            parse_item(kind, item, &mut values)?;
        }
        Ok(Self { values })
    }

    pub(crate) fn fixed(value: u32) -> Self {
        Self {
            values: ValueSet::single(value),
        }
    }
}

/// Parse one comma-separated item (`*`, `n`, `a-b`, `*/s`, `a/s`, `a-b/s`) into `values`.
fn parse_item(kind: FieldKind, item: &str, values: &mut ValueSet) -> Result<(), String> {
    if item.is_empty() {
        return Err(format!("empty item in {} field", kind.name()));
    }

    let (range, step) = match item.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("invalid step '{}' in {} field", step, kind.name()))?;
            if step == 0 {
                return Err(format!("step must be positive in {} field", kind.name()));
            }
            (range, Some(step))
        }
        None => (item, None),
    };

    let (min, max) = kind.bounds();
    let (start, end) = if range == "*" {
        (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
        let start = kind.parse_value(a)?;
        let end = kind.parse_value(b)?;
        if start > end {
            return Err(format!(
                "range {}-{} is reversed in {} field",
                start,
                end,
                kind.name()
            ));
        }
        (start, end)
    } else {
        let start = kind.parse_value(range)?;
        // `a/s` means "from a to the end of the range every s"
        (start, if step.is_some() { max } else { start })
    };

    let step = step.unwrap_or(1);
    let mut value = start;
    while value <= end {
        let normalized = if kind == FieldKind::DayOfWeek && value == 7 { 0 } else { value };
        values.insert(normalized);
        match value.checked_add(step) {
            Some(next) => value = next,
            None => break,
        }
    }
    Ok(())
}

/// `true` when a day field is unrestricted for OR/AND purposes (starts with `*` or is `?`).
fn is_unrestricted(text: &str) -> bool {
    text.starts_with('*') || text == "?"
}

/// Day-of-month field with `L`, `LW` and `nW` specials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DaysOfMonth {
    values: ValueSet,
    last_day: bool,
    last_weekday: bool,
    nearest_weekday: ValueSet,
    pub(crate) unrestricted: bool,
}

impl DaysOfMonth {
    pub(crate) fn parse(text: &str) -> Result<Self, String> {
        let kind = FieldKind::DayOfMonth;
        let mut field = Self {
            values: ValueSet::default(),
            last_day: false,
            last_weekday: false,
            nearest_weekday: ValueSet::default(),
            unrestricted: is_unrestricted(text),
        };

        if text == "?" {
            field.values = Field::parse(kind, "*")?.values;
            return Ok(field);
        }

        for item in text.split(',') {
            let upper = item.to_ascii_uppercase();
            if upper == "L" {
                field.last_day = true;
            } else if upper == "LW" {
                field.last_weekday = true;
            } else if let Some(day) = upper.strip_suffix('W') {
                let day = kind.parse_value(day)?;
                field.nearest_weekday.insert(day);
            } else {
                parse_item(kind, item, &mut field.values)?;
            }
        }
        Ok(field)
    }

    pub(crate) fn matches(&self, date: NaiveDate) -> bool {
        let day = date.day();
        if self.values.contains(day) {
            return true;
        }

        let last = days_in_month(date.year(), date.month());
        if self.last_day && day == last {
            return true;
        }
        if self.last_weekday && Some(day) == nearest_weekday(date.year(), date.month(), last) {
            return true;
        }
        if self.nearest_weekday.is_empty() {
            return false;
        }
        (1..=last)
            .filter(|d| self.nearest_weekday.contains(*d))
            .any(|d| nearest_weekday(date.year(), date.month(), d) == Some(day))
    }
}

/// Day-of-week field with `nL` (last weekday n of the month) and `n#k` (k-th weekday n).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DaysOfWeek {
    values: ValueSet,
    last_of_month: ValueSet,
    nth: Vec<(u32, u32)>,
    pub(crate) unrestricted: bool,
}

impl DaysOfWeek {
    pub(crate) fn parse(text: &str) -> Result<Self, String> {
        let kind = FieldKind::DayOfWeek;
        let mut field = Self {
            values: ValueSet::default(),
            last_of_month: ValueSet::default(),
            nth: Vec::new(),
            unrestricted: is_unrestricted(text),
        };

        if text == "?" {
            field.values = Field::parse(kind, "*")?.values;
            return Ok(field);
        }

        for item in text.split(',') {
            let upper = item.to_ascii_uppercase();
            if upper == "L" {
                // bare L in this field is the last day of the week
                field.values.insert(6);
            } else if let Some((weekday, nth)) = upper.split_once('#') {
                let weekday = kind.parse_value(weekday)? % 7;
                let nth: u32 = nth
                    .parse()
                    .map_err(|_| format!("invalid occurrence '{}' in day-of-week field", nth))?;
                if !(1..=5).contains(&nth) {
                    return Err(format!("occurrence {} out of range 1-5 in day-of-week field", nth));
                }
                field.nth.push((weekday, nth));
            } else if let Some(weekday) = upper.strip_suffix('L') {
                let weekday = kind.parse_value(weekday)? % 7;
                field.last_of_month.insert(weekday);
            } else {
                parse_item(kind, item, &mut field.values)?;
            }
        }
        Ok(field)
    }

    pub(crate) fn matches(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().num_days_from_sunday();
        if self.values.contains(weekday) {
            return true;
        }

        let day = date.day();
        if self.last_of_month.contains(weekday) && day + 7 > days_in_month(date.year(), date.month()) {
            return true;
        }
        self.nth
            .iter()
            .any(|&(wd, nth)| wd == weekday && (day - 1) / 7 + 1 == nth)
    }
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

/// Weekday closest to `day` without leaving the month; `None` when the month is too short.
fn nearest_weekday(year: i32, month: u32, day: u32) -> Option<u32> {
    let last = days_in_month(year, month);
    if day > last {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let resolved = match date.weekday().num_days_from_sunday() {
        // Saturday: back to Friday, or forward to Monday on the 1st
        6 if day == 1 => day + 2,
        6 => day - 1,
        // Sunday: forward to Monday, or back to Friday on the last day
        0 if day == last => day - 2,
        0 => day + 1,
        _ => day,
    };
    Some(resolved)
}
