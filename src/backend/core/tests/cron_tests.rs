//! Integration tests for cron expression evaluation.
//!
//! Tests cover:
//! - Common operational schedules
//! - Ordering and matching of long occurrence runs
//! - Names, aliases and calendar specials
//! - Rejections
//! - Text round-trips

use cadence_core::error::ErrorCode;
use cadence_core::schedule::CronExpression;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn next(expression: &str, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    CronExpression::parse(expression).unwrap().next_occurrence(from)
}

// ============================================================================
// Operational schedules
// ============================================================================

#[test]
fn test_business_hours_skip_weekend() {
    // Friday 2024-06-07 after the last slot -> Monday 09:00
    assert_eq!(next("0 9-17 * * MON-FRI", at(2024, 6, 7, 17, 30, 0)), Some(at(2024, 6, 10, 9, 0, 0)));
    assert_eq!(next("0 9-17 * * MON-FRI", at(2024, 6, 10, 9, 0, 0)), Some(at(2024, 6, 10, 10, 0, 0)));
}

#[test]
fn test_quarterly_report() {
    let cron = "0 6 1 1,4,7,10 *";
    assert_eq!(next(cron, at(2024, 4, 1, 6, 0, 0)), Some(at(2024, 7, 1, 6, 0, 0)));
    assert_eq!(next(cron, at(2024, 11, 20, 0, 0, 0)), Some(at(2025, 1, 1, 6, 0, 0)));
}

#[test]
fn test_every_fifteen_minutes() {
    let cron = CronExpression::parse("*/15 * * * *").unwrap();
    assert_eq!(
        cron.upcoming(at(2024, 3, 10, 10, 7, 0), 4),
        vec![
            at(2024, 3, 10, 10, 15, 0),
            at(2024, 3, 10, 10, 30, 0),
            at(2024, 3, 10, 10, 45, 0),
            at(2024, 3, 10, 11, 0, 0),
        ]
    );
}

#[test]
fn test_end_of_month_billing() {
    let cron = CronExpression::parse("0 23 L * ?").unwrap();
    assert_eq!(
        cron.upcoming(at(2024, 1, 15, 0, 0, 0), 3),
        vec![at(2024, 1, 31, 23, 0, 0), at(2024, 2, 29, 23, 0, 0), at(2024, 3, 31, 23, 0, 0)]
    );
}

#[test]
fn test_last_friday_of_month() {
    // June 28 and July 26 2024 are the last Fridays
    assert_eq!(next("0 18 ? * 5L", at(2024, 6, 1, 0, 0, 0)), Some(at(2024, 6, 28, 18, 0, 0)));
    assert_eq!(next("0 18 ? * 5L", at(2024, 6, 28, 18, 0, 0)), Some(at(2024, 7, 26, 18, 0, 0)));
}

#[test]
fn test_nearest_weekday_payroll() {
    // 2024-06-15 is a Saturday, so payroll runs Friday the 14th
    assert_eq!(next("0 8 15W * ?", at(2024, 6, 1, 0, 0, 0)), Some(at(2024, 6, 14, 8, 0, 0)));
}

// ============================================================================
// Occurrence runs
// ============================================================================

const CALENDAR_EXPRESSIONS: [&str; 12] = [
    "*/7 * * * *",
    "*/20 * * * * *",
    "0 23 L * ?",
    "0 8 15W * ?",
    "0 8 1W * ?",
    "0 18 LW * ?",
    "0 18 ? * 5L",
    "0 9 ? * 1#3",
    "0 0 13 * FRI",
    "30 6 1,15 * MON",
    "0 0 */2 * MON",
    "0 12 29 2 *",
];

#[test]
fn test_upcoming_is_strictly_increasing_and_matching() {
    for from in [at(2023, 12, 31, 23, 59, 59), at(2024, 2, 28, 12, 0, 30)] {
        for expression in CALENDAR_EXPRESSIONS {
            let cron = CronExpression::parse(expression).unwrap();
            let runs = cron.upcoming(from, 50);
            assert_eq!(runs.len(), 50, "{} ran out", expression);

            let mut previous = from;
            for run in runs {
                assert!(run > previous, "{}: {} not after {}", expression, run, previous);
                assert!(cron.matches(run), "{}: {} does not match", expression, run);
                assert_eq!(cron.next_occurrence(previous), Some(run), "{} skipped a run", expression);
                previous = run;
            }
        }
    }
}

#[test]
fn test_restricted_day_fields_are_ored() {
    let runs = CronExpression::parse("0 0 13 * FRI").unwrap().upcoming(at(2024, 1, 1, 0, 0, 0), 40);
    assert!(runs.iter().all(|r| r.day() == 13 || r.weekday() == Weekday::Fri));
    assert!(runs.iter().any(|r| r.day() == 13 && r.weekday() != Weekday::Fri));
    assert!(runs.iter().any(|r| r.day() != 13 && r.weekday() == Weekday::Fri));
}

#[test]
fn test_stepped_star_day_field_is_anded() {
    // `*/2` counts as unrestricted, so both fields must hold: odd-numbered Mondays only
    let runs = CronExpression::parse("0 0 */2 * MON").unwrap().upcoming(at(2024, 1, 1, 0, 0, 0), 30);
    assert!(runs.iter().all(|r| r.weekday() == Weekday::Mon && r.day() % 2 == 1));
}

#[test]
fn test_nth_weekday_stays_in_its_week() {
    let runs = CronExpression::parse("0 9 ? * 1#3").unwrap().upcoming(at(2024, 1, 1, 0, 0, 0), 24);
    assert!(runs
        .iter()
        .all(|r| r.weekday() == Weekday::Mon && (15..=21).contains(&r.day()) && r.hour() == 9));
    assert_eq!(runs[0], at(2024, 1, 15, 9, 0, 0));
}

#[test]
fn test_no_occurrence_past_the_end_of_time() {
    let cron = CronExpression::every_minute();
    assert_eq!(cron.next_occurrence(DateTime::<Utc>::MAX_UTC), None);
    assert!(cron.upcoming(DateTime::<Utc>::MAX_UTC, 3).is_empty());
}

// ============================================================================
// Names & aliases
// ============================================================================

#[test]
fn test_month_names_case_insensitive() {
    assert_eq!(next("0 0 1 jan,JUL *", at(2024, 2, 10, 0, 0, 0)), Some(at(2024, 7, 1, 0, 0, 0)));
}

#[test]
fn test_sunday_as_seven() {
    // 2024-06-01 is a Saturday
    assert_eq!(next("0 0 * * 7", at(2024, 6, 1, 0, 0, 0)), next("0 0 * * SUN", at(2024, 6, 1, 0, 0, 0)));
    assert_eq!(next("0 0 * * 7", at(2024, 6, 1, 0, 0, 0)), Some(at(2024, 6, 2, 0, 0, 0)));
}

#[test]
fn test_six_field_seconds() {
    let cron = CronExpression::parse("15,45 * * * * *").unwrap();
    assert!(cron.has_seconds());
    assert_eq!(cron.next_occurrence(at(2024, 1, 1, 0, 0, 15)), Some(at(2024, 1, 1, 0, 0, 45)));
    assert_eq!(cron.next_occurrence(at(2024, 1, 1, 0, 0, 45)), Some(at(2024, 1, 1, 0, 1, 15)));
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_rejects_out_of_range_and_malformed() {
    for bad in [
        "60 * * * *",
        "* 24 * * *",
        "* * 32 * *",
        "* * * 13 *",
        "* * * * 8",
        "*/0 * * * *",
        "5-1 * * * *",
        "a b c d e",
        "* * * * * * *",
    ] {
        let err = CronExpression::parse(bad).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSchedule, "{} should be rejected", bad);
    }
}

#[test]
fn test_huge_step_does_not_overflow() {
    let cron = CronExpression::parse("5/4294967295 * * * *").unwrap();
    let runs = cron.upcoming(at(2024, 1, 1, 0, 0, 0), 3);
    assert_eq!(runs, vec![at(2024, 1, 1, 0, 5, 0), at(2024, 1, 1, 1, 5, 0), at(2024, 1, 1, 2, 5, 0)]);

    let cron = CronExpression::parse("58-59/4294967295 * * * * *").unwrap();
    assert_eq!(cron.next_occurrence(at(2024, 1, 1, 0, 0, 0)), Some(at(2024, 1, 1, 0, 0, 58)));
}

#[test]
fn test_unsatisfiable_expression_has_no_occurrence() {
    let cron = CronExpression::parse("0 0 31 4 *").unwrap();
    assert_eq!(cron.next_occurrence(at(2024, 1, 1, 0, 0, 0)), None);
}

// ============================================================================
// Text
// ============================================================================

#[test]
fn test_parse_display_round_trip() {
    let cron: CronExpression = "0  12 *  * SUN".parse().unwrap();
    assert_eq!(cron.to_string(), "0 12 * * SUN");
    assert_eq!(cron.to_string().parse::<CronExpression>().unwrap(), cron);
}
