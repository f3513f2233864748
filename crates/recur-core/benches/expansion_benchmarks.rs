use chrono::{NaiveDate, NaiveTime, Weekday};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use recur_core::exceptions::ExceptionSet;
use recur_core::models::{
    ExceptionAction, Frequency, OccurrenceDefaults, RecurrenceSpec, SeriesException,
};
use recur_core::recurrence::{expand, next_occurrence, rrule, RuleCompiler};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn spec(frequency: Frequency) -> RecurrenceSpec {
    RecurrenceSpec::new(frequency, date(2024, 1, 1), NaiveTime::from_hms_opt(10, 0, 0).unwrap())
}

fn defaults() -> OccurrenceDefaults {
    OccurrenceDefaults {
        provider_id: "prov-1".to_string(),
        service_id: "svc-1".to_string(),
        service_name: "Laser Hair Removal".to_string(),
        duration_minutes: 45,
        notes: None,
        room_id: Some("room-2".to_string()),
    }
}

fn bench_compile(c: &mut Criterion) {
    let mut weekly = spec(Frequency::Weekly);
    weekly.by_day = vec![Weekday::Fri, Weekday::Mon, Weekday::Wed];
    weekly.occurrence_count = Some(120);

    c.bench_function("compile_weekly_by_day", |b| {
        b.iter(|| RuleCompiler::compile(black_box(&weekly)).unwrap())
    });

    let encoding = RuleCompiler::compile(&weekly).unwrap().encoding;
    c.bench_function("parse_encoding", |b| b.iter(|| rrule::parse(black_box(&encoding)).unwrap()));
}

fn bench_expand_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("expand_one_year");
    let defaults = defaults();

    let mut monthly = spec(Frequency::Monthly);
    monthly.by_day = vec![Weekday::Tue];
    monthly.by_set_pos = Some(2);

    let mut weekly = spec(Frequency::Weekly);
    weekly.by_day = vec![Weekday::Mon, Weekday::Thu];

    for (name, spec) in [
        ("daily", spec(Frequency::Daily)),
        ("weekly_two_days", weekly),
        ("biweekly", spec(Frequency::Biweekly)),
        ("monthly_second_tuesday", monthly),
    ] {
        let rule = RuleCompiler::compile(&spec).unwrap().rule;
        let exceptions = ExceptionSet::default();
        group.bench_with_input(BenchmarkId::from_parameter(name), &rule, |b, rule| {
            b.iter(|| {
                expand(
                    black_box(rule),
                    &defaults,
                    &exceptions,
                    date(2024, 1, 1),
                    date(2024, 12, 31),
                    false,
                )
            })
        });
    }
    group.finish();
}

fn bench_far_window(c: &mut Criterion) {
    let rule = RuleCompiler::compile(&spec(Frequency::Daily)).unwrap().rule;
    let defaults = defaults();
    let exceptions = ExceptionSet::default();

    // Window ten years past the anchor: iteration must skip ahead.
    c.bench_function("expand_daily_far_window", |b| {
        b.iter(|| {
            expand(
                black_box(&rule),
                &defaults,
                &exceptions,
                date(2034, 3, 1),
                date(2034, 3, 31),
                false,
            )
        })
    });
}

fn bench_exception_overlay(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_occurrence_with_skips");
    let rule = RuleCompiler::compile(&spec(Frequency::Daily)).unwrap().rule;

    for skipped in [0u32, 30, 180] {
        let exceptions: ExceptionSet = (0..skipped)
            .map(|offset| {
                SeriesException::new(
                    date(2024, 1, 1) + chrono::Duration::days(offset as i64),
                    ExceptionAction::Skip,
                    None,
                )
            })
            .collect::<Vec<_>>()
            .into();

        group.bench_with_input(BenchmarkId::from_parameter(skipped), &exceptions, |b, exceptions| {
            b.iter(|| next_occurrence(black_box(&rule), exceptions, date(2024, 1, 1), 366))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_compile,
    bench_expand_window,
    bench_far_window,
    bench_exception_overlay
);
criterion_main!(benches);
