//! Cron evaluation benchmarks. Run with: cargo bench --bench cron_bench
use cadence_core::schedule::CronExpression;
use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

const EXPRESSIONS: [(&str, &str); 7] = [
    ("every_minute", "* * * * *"),
    ("every_5s", "*/5 * * * * *"),
    ("business_hours", "0 9-17 * * MON-FRI"),
    ("quarterly", "0 6 1 1,4,7,10 *"),
    ("last_day", "0 23 L * ?"),
    ("second_tuesday", "30 14 ? * TUE#2"),
    ("leap_day", "0 0 29 2 *"),
];

fn bench_parse(c: &mut Criterion) {
    let mut g = c.benchmark_group("cron_parse");
    for (name, text) in EXPRESSIONS {
        g.bench_with_input(BenchmarkId::from_parameter(name), &text, |b, text| {
            b.iter(|| black_box(CronExpression::parse(black_box(text)).unwrap()));
        });
    }
    g.bench_function("invalid", |b| b.iter(|| black_box(CronExpression::parse(black_box("61 * * * *")).is_err())));
    g.finish();
}

fn bench_next_occurrence(c: &mut Criterion) {
    let mut g = c.benchmark_group("cron_next_occurrence"); g.measurement_time(Duration::from_secs(5));
    let from = Utc.with_ymd_and_hms(2024, 3, 1, 12, 34, 56).unwrap();
    for (name, text) in EXPRESSIONS {
        let cron = CronExpression::parse(text).unwrap();
        g.bench_with_input(BenchmarkId::from_parameter(name), &cron, |b, cron| {
            b.iter(|| black_box(cron.next_occurrence(black_box(from))));
        });
    }
    g.finish();
}

fn bench_unsatisfiable(c: &mut Criterion) {
    let mut g = c.benchmark_group("cron_unsatisfiable"); g.sample_size(20);
    let cron = CronExpression::parse("0 0 30 2 *").unwrap();
    let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    g.bench_function("feb_30", |b| b.iter(|| black_box(cron.next_occurrence(black_box(from)))));
    g.finish();
}

fn bench_upcoming(c: &mut Criterion) {
    let mut g = c.benchmark_group("cron_upcoming");
    let cron = CronExpression::parse("*/15 * * * *").unwrap();
    let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for count in [10usize, 100, 1000] {
        g.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| black_box(cron.upcoming(from, count)));
        });
    }
    g.finish();
}

criterion_group!(benches, bench_parse, bench_next_occurrence, bench_unsatisfiable, bench_upcoming);
criterion_main!(benches);
