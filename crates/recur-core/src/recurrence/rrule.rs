//! Canonical text encoding of a [`RecurrenceRule`].
//!
//! ```text
//! DTSTART:20240101T100000
//! RRULE:FREQ=MONTHLY;INTERVAL=1;BYDAY=MO;BYSETPOS=1;COUNT=6
//! ```
//!
//! Tokens are always written in the order FREQ, INTERVAL, BYDAY, BYMONTHDAY,
//! BYSETPOS, then UNTIL or COUNT. Times are civil wall-clock values without a
//! zone designator; UNTIL always carries the last second of its day.
//!
//! Date generation is delegated to the `rrule` crate through
//! [`to_rrule_set`], which reads the wall-clock anchor as UTC.

use ::rrule::RRuleSet;
use chrono::{NaiveDate, NaiveDateTime, Weekday};

use crate::error::CoreError;
use crate::models::EndCondition;
use crate::recurrence::rule::{Freq, RecurrenceRule};

const DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";
const DATE_FORMAT: &str = "%Y%m%d";

pub fn encode(rule: &RecurrenceRule) -> String {
    format!(
        "DTSTART:{}\nRRULE:{}",
        rule.anchor.format(DATETIME_FORMAT),
        rule_tokens(rule, "").join(";")
    )
}

/// Builds the `rrule` crate's view of a rule.
///
/// DTSTART and UNTIL are written in UTC so the crate never applies a zone
/// offset; the generated date-times are the engine's civil times.
pub fn to_rrule_set(rule: &RecurrenceRule) -> Result<RRuleSet, CoreError> {
    let text = format!(
        "DTSTART:{}Z\nRRULE:{}",
        rule.anchor.format(DATETIME_FORMAT),
        rule_tokens(rule, "Z").join(";")
    );
    text.parse::<RRuleSet>()
        .map_err(|e| invalid(format!("rule '{}' rejected: {}", text.replace('\n', " "), e)))
}

fn rule_tokens(rule: &RecurrenceRule, until_suffix: &str) -> Vec<String> {
    let mut tokens = vec![
        format!("FREQ={}", freq_token(rule.freq)),
        format!("INTERVAL={}", rule.interval),
    ];

    if !rule.by_day.is_empty() {
        let days: Vec<&str> = rule.by_day.iter().map(|d| weekday_token(*d)).collect();
        tokens.push(format!("BYDAY={}", days.join(",")));
    }
    if let Some(day) = rule.by_month_day {
        tokens.push(format!("BYMONTHDAY={}", day));
    }
    if let Some(pos) = rule.by_set_pos {
        tokens.push(format!("BYSETPOS={}", pos));
    }
    match rule.end {
        EndCondition::Never => {}
        EndCondition::Until(date) => tokens.push(format!("UNTIL={}{}", format_until(date), until_suffix)),
        EndCondition::Count(n) => tokens.push(format!("COUNT={}", n)),
    }
    tokens
}

/// Parses a canonical encoding.
///
/// Only the canonical token subset is accepted: unknown or repeated tokens,
/// ordinal weekdays and malformed values are rejected here, and the rule is
/// then checked by [`RecurrenceRule::validate`], which also hands it to the
/// `rrule` crate. No partially-built rule escapes.
pub fn parse(encoding: &str) -> Result<RecurrenceRule, CoreError> {
    let mut dtstart = None;
    let mut rrule = None;

    for line in encoding.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(value) = line.strip_prefix("DTSTART:") {
            if dtstart.replace(parse_datetime(value)?).is_some() {
                return Err(invalid("duplicate DTSTART"));
            }
        } else if let Some(value) = line.strip_prefix("RRULE:") {
            if rrule.replace(value).is_some() {
                return Err(invalid("duplicate RRULE"));
            }
        } else {
            return Err(invalid(format!("unexpected line '{}'", line)));
        }
    }

    let anchor = dtstart.ok_or_else(|| invalid("missing DTSTART"))?;
    let body = rrule.ok_or_else(|| invalid("missing RRULE"))?;

    let mut freq = None;
    let mut interval = None;
    let mut by_day = None;
    let mut by_month_day = None;
    let mut by_set_pos = None;
    let mut until = None;
    let mut count = None;

    for token in body.split(';').filter(|t| !t.is_empty()) {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| invalid(format!("malformed token '{}'", token)))?;

        let duplicate = match key {
            "FREQ" => freq.replace(parse_freq(value)?).is_some(),
            "INTERVAL" => interval.replace(parse_number::<u32>(key, value)?).is_some(),
            "BYDAY" => by_day.replace(parse_by_day(value)?).is_some(),
            "BYMONTHDAY" => by_month_day.replace(parse_number::<u32>(key, value)?).is_some(),
            "BYSETPOS" => by_set_pos.replace(parse_number::<i32>(key, value)?).is_some(),
            "UNTIL" => until.replace(parse_until(value)?).is_some(),
            "COUNT" => count.replace(parse_number::<u32>(key, value)?).is_some(),
            _ => return Err(invalid(format!("unknown token '{}'", key))),
        };
        if duplicate {
            return Err(invalid(format!("duplicate token '{}'", key)));
        }
    }

    let end = match (until, count) {
        (Some(_), Some(_)) => return Err(invalid("UNTIL and COUNT are mutually exclusive")),
        (Some(date), None) => EndCondition::Until(date),
        (None, Some(n)) => EndCondition::Count(n),
        (None, None) => EndCondition::Never,
    };

    let mut rule = RecurrenceRule::new(
        freq.ok_or_else(|| invalid("missing FREQ"))?,
        interval.unwrap_or(1),
        anchor,
    );
    rule.by_day = by_day.unwrap_or_default();
    rule.by_month_day = by_month_day;
    rule.by_set_pos = by_set_pos;
    rule.end = end;
    rule.normalize();
    rule.validate().map_err(CoreError::InvalidRRule)?;

    Ok(rule)
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidRRule(message.into())
}

pub fn freq_token(freq: Freq) -> &'static str {
    match freq {
        Freq::Daily => "DAILY",
        Freq::Weekly => "WEEKLY",
        Freq::Monthly => "MONTHLY",
    }
}

pub fn parse_freq(value: &str) -> Result<Freq, CoreError> {
    match value {
        "DAILY" => Ok(Freq::Daily),
        "WEEKLY" => Ok(Freq::Weekly),
        "MONTHLY" => Ok(Freq::Monthly),
        other => Err(invalid(format!("unsupported FREQ '{}'", other))),
    }
}

pub fn weekday_token(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

pub fn parse_weekday(value: &str) -> Result<Weekday, CoreError> {
    match value {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(invalid(format!("unknown weekday '{}'", other))),
    }
}

fn parse_by_day(value: &str) -> Result<Vec<Weekday>, CoreError> {
    let days = value
        .split(',')
        .map(parse_weekday)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(days)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CoreError> {
    value
        .parse()
        .map_err(|_| invalid(format!("invalid {} value '{}'", key, value)))
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, CoreError> {
    let value = value.strip_suffix('Z').unwrap_or(value);
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .map_err(|_| invalid(format!("invalid date-time '{}'", value)))
}

pub fn format_until(date: NaiveDate) -> String {
    format!("{}T235959", date.format(DATE_FORMAT))
}

/// Accepts a bare date or a date-time; only the date part is kept.
pub fn parse_until(value: &str) -> Result<NaiveDate, CoreError> {
    if value.contains('T') {
        parse_datetime(value).map(|dt| dt.date())
    } else {
        NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map_err(|_| invalid(format!("invalid UNTIL '{}'", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, RecurrenceSpec};
    use crate::recurrence::rule::RuleCompiler;
    use chrono::NaiveTime;
    use proptest::prelude::*;
    use rstest::rstest;

    const HEAD: &str = "DTSTART:20240603T100000\nRRULE:";

    fn anchor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[rstest]
    #[case(Weekday::Mon, "MO")]
    #[case(Weekday::Tue, "TU")]
    #[case(Weekday::Wed, "WE")]
    #[case(Weekday::Thu, "TH")]
    #[case(Weekday::Fri, "FR")]
    #[case(Weekday::Sat, "SA")]
    #[case(Weekday::Sun, "SU")]
    fn test_weekday_tokens(#[case] day: Weekday, #[case] token: &str) {
        assert_eq!(weekday_token(day), token);
        assert_eq!(parse_weekday(token).unwrap(), day);
    }

    #[rstest]
    #[case("20240630", 2024, 6, 30)]
    #[case("20240630T235959", 2024, 6, 30)]
    #[case("20240630T000000Z", 2024, 6, 30)]
    fn test_parse_until(#[case] value: &str, #[case] y: i32, #[case] m: u32, #[case] d: u32) {
        assert_eq!(parse_until(value).unwrap(), NaiveDate::from_ymd_opt(y, m, d).unwrap());
    }

    #[test]
    fn test_format_until_uses_end_of_day() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(format_until(date), "20241231T235959");
    }

    #[test]
    fn test_parse_full_rule() {
        let rule = parse(&format!("{}FREQ=MONTHLY;INTERVAL=2;BYDAY=FR,MO;BYSETPOS=-1;COUNT=4", HEAD)).unwrap();
        assert_eq!(rule.freq, Freq::Monthly);
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.anchor, anchor());
        assert_eq!(rule.by_day, vec![Weekday::Mon, Weekday::Fri]);
        assert_eq!(rule.by_set_pos, Some(-1));
        assert_eq!(rule.end, EndCondition::Count(4));
    }

    #[test]
    fn test_interval_defaults_to_one() {
        let rule = parse(&format!("{}FREQ=DAILY", HEAD)).unwrap();
        assert_eq!(rule.interval, 1);
        assert_eq!(rule.end, EndCondition::Never);
    }

    #[rstest]
    #[case::unknown_token("FREQ=DAILY;WKST=MO")]
    #[case::duplicate_token("FREQ=DAILY;INTERVAL=1;INTERVAL=2")]
    #[case::missing_freq("INTERVAL=2")]
    #[case::bad_freq("FREQ=YEARLY")]
    #[case::bad_interval("FREQ=DAILY;INTERVAL=x")]
    #[case::bad_weekday("FREQ=WEEKLY;BYDAY=XX")]
    #[case::ordinal_weekday("FREQ=MONTHLY;BYDAY=1MO")]
    #[case::until_and_count("FREQ=DAILY;UNTIL=20240701;COUNT=3")]
    #[case::malformed("FREQ")]
    #[case::rule_violation("FREQ=DAILY;BYMONTHDAY=3")]
    #[case::until_before_start("FREQ=DAILY;UNTIL=20240101")]
    fn test_rejects_invalid_rrule(#[case] body: &str) {
        let err = parse(&format!("{}{}", HEAD, body)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRRule(_)), "got {:?}", err);
    }

    #[test]
    fn test_rrule_set_generates_wall_clock_dates() {
        let rule = parse(&format!("{}FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,TH;UNTIL=20240630T235959", HEAD)).unwrap();
        let set = to_rrule_set(&rule).unwrap();
        let starts: Vec<NaiveDateTime> = (&set).into_iter().map(|dt| dt.naive_utc()).collect();

        let expected: Vec<NaiveDateTime> = [(6, 3), (6, 6), (6, 17), (6, 20)]
            .iter()
            .map(|(m, d)| NaiveDate::from_ymd_opt(2024, *m, *d).unwrap().and_hms_opt(10, 0, 0).unwrap())
            .collect();
        assert_eq!(starts, expected);
    }

    #[test]
    fn test_rejects_missing_dtstart() {
        assert!(matches!(parse("RRULE:FREQ=DAILY"), Err(CoreError::InvalidRRule(_))));
        assert!(matches!(
            parse("DTSTART:20240603T100000\nEXDATE:20240604T100000\nRRULE:FREQ=DAILY"),
            Err(CoreError::InvalidRRule(_))
        ));
    }

    fn weekday_strategy() -> impl Strategy<Value = Weekday> {
        (0u8..7).prop_map(|n| match n {
            0 => Weekday::Mon,
            1 => Weekday::Tue,
            2 => Weekday::Wed,
            3 => Weekday::Thu,
            4 => Weekday::Fri,
            5 => Weekday::Sat,
            _ => Weekday::Sun,
        })
    }

    prop_compose! {
        fn valid_spec()(
            kind in 0u8..6,
            interval in 1u32..=12,
            day_offset in 0i64..3000,
            hour in 0u32..24,
            minute in 0u32..60,
            days in proptest::collection::vec(weekday_strategy(), 1..4),
            month_day in 1u32..=31,
            set_pos in prop_oneof![-5i32..=-1, 1i32..=5],
            end_kind in 0u8..3,
            end_offset in 0i64..800,
            count in 1u32..=365,
        ) -> RecurrenceSpec {
            let start_date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Duration::days(day_offset);
            let start_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
            let frequency = match kind {
                0 => Frequency::Daily,
                1 | 2 => Frequency::Weekly,
                3 => Frequency::Biweekly,
                _ => Frequency::Monthly,
            };
            let mut spec = RecurrenceSpec::new(frequency, start_date, start_time);
            spec.interval = interval;
            match kind {
                2 | 3 => spec.by_day = days,
                4 => spec.by_month_day = Some(month_day),
                5 => {
                    spec.by_day = days;
                    spec.by_set_pos = Some(set_pos);
                }
                _ => {}
            }
            match end_kind {
                1 => spec.end_date = Some(start_date + chrono::Duration::days(end_offset)),
                2 => spec.occurrence_count = Some(count),
                _ => {}
            }
            spec
        }
    }

    proptest! {
        #[test]
        fn prop_parse_inverts_compile(spec in valid_spec()) {
            let compiled = RuleCompiler::compile(&spec).unwrap();
            let parsed = parse(&compiled.encoding).unwrap();
            prop_assert_eq!(&parsed, &compiled.rule);
            prop_assert_eq!(encode(&parsed), compiled.encoding);
        }
    }
}
