use chrono::{NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::models::{EndCondition, Frequency, RecurrenceSpec};
use crate::recurrence::rrule;

/// Largest interval a caller may request.
pub const MAX_INTERVAL: u32 = 12;
/// Largest occurrence count a caller may request.
pub const MAX_OCCURRENCE_COUNT: u32 = 365;
/// Largest absolute set position ("5th", "5th from last").
pub const MAX_SET_POS: i32 = 5;

/// Normalized repetition frequency. Biweekly has been folded into `Weekly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Freq {
    Daily,
    Weekly,
    Monthly,
}

/// A compiled, normalized repetition rule.
///
/// Weekdays are kept sorted Monday-first without duplicates so that two
/// equivalent rules compare equal and encode identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub freq: Freq,
    pub interval: u32,
    /// First instant of the series, in civil (wall-clock) time
    pub anchor: NaiveDateTime,
    pub by_day: Vec<Weekday>,
    pub by_month_day: Option<u32>,
    pub by_set_pos: Option<i32>,
    pub end: EndCondition,
}

impl RecurrenceRule {
    pub fn new(freq: Freq, interval: u32, anchor: NaiveDateTime) -> Self {
        Self {
            freq,
            interval,
            anchor,
            by_day: Vec::new(),
            by_month_day: None,
            by_set_pos: None,
            end: EndCondition::Never,
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.anchor.date()
    }

    /// Sorts and deduplicates the weekday set.
    pub fn normalize(&mut self) {
        self.by_day.sort_by_key(|d| d.num_days_from_monday());
        self.by_day.dedup();
    }

    /// Checks the structural constraints every compiled rule satisfies, then
    /// that the `rrule` crate accepts the rule.
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        // Biweekly doubles the caller's interval.
        if self.interval == 0 || self.interval > MAX_INTERVAL * 2 {
            return Err(format!("interval {} out of range", self.interval));
        }

        if let Some(day) = self.by_month_day {
            if !(1..=31).contains(&day) {
                return Err(format!("day of month {} must be between 1 and 31", day));
            }
            if self.freq != Freq::Monthly {
                return Err("day of month is only allowed for monthly rules".to_string());
            }
            if !self.by_day.is_empty() {
                return Err("day of month and days of week are mutually exclusive".to_string());
            }
        }

        if !self.by_day.is_empty() && self.freq == Freq::Daily {
            return Err("days of week are not allowed for daily rules".to_string());
        }

        if let Some(pos) = self.by_set_pos {
            if pos == 0 || pos.abs() > MAX_SET_POS {
                return Err(format!(
                    "set position {} must be between -{} and {} and not zero",
                    pos, MAX_SET_POS, MAX_SET_POS
                ));
            }
            if self.freq != Freq::Monthly {
                return Err("set position is only allowed for monthly rules".to_string());
            }
            if self.by_day.is_empty() {
                return Err("set position requires days of week".to_string());
            }
        }

        match self.end {
            EndCondition::Never => {}
            EndCondition::Count(n) => {
                if n == 0 || n > MAX_OCCURRENCE_COUNT {
                    return Err(format!(
                        "occurrence count {} must be between 1 and {}",
                        n, MAX_OCCURRENCE_COUNT
                    ));
                }
            }
            EndCondition::Until(until) => {
                if until < self.start_date() {
                    return Err(format!(
                        "end date {} is before start date {}",
                        until,
                        self.start_date()
                    ));
                }
            }
        }

        rrule::to_rrule_set(self).map(|_| ()).map_err(|e| e.to_string())
    }
}

/// Result of compiling a [`RecurrenceSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub rule: RecurrenceRule,
    /// Canonical encoding of `rule`
    pub encoding: String,
}

/// Turns caller-supplied recurrence specs into normalized rules and their
/// canonical encoding.
pub struct RuleCompiler;

impl RuleCompiler {
    /// Compiles a recurrence spec.
    ///
    /// # Arguments
    /// * `spec` - The abstract repetition rule
    ///
    /// # Returns
    /// * `Result<CompiledRule, CoreError>` - Normalized rule and encoding, or
    ///   `InvalidSpec` describing the first violation
    ///
    /// # Behavior
    /// - Biweekly becomes weekly with a doubled interval
    /// - When both an end date and a count are given, the end date wins
    /// - Sub-second precision of the start time is dropped
    pub fn compile(spec: &RecurrenceSpec) -> Result<CompiledRule, CoreError> {
        if spec.interval == 0 || spec.interval > MAX_INTERVAL {
            return Err(CoreError::InvalidSpec(format!(
                "interval must be between 1 and {}, got {}",
                MAX_INTERVAL, spec.interval
            )));
        }

        let (freq, interval) = match spec.frequency {
            Frequency::Daily => (Freq::Daily, spec.interval),
            Frequency::Weekly => (Freq::Weekly, spec.interval),
            Frequency::Biweekly => (Freq::Weekly, spec.interval * 2),
            Frequency::Monthly => (Freq::Monthly, spec.interval),
        };

        let start_time = spec.start_time.with_nanosecond(0).unwrap_or(spec.start_time);
        let mut rule = RecurrenceRule::new(freq, interval, spec.start_date.and_time(start_time));
        rule.by_day = spec.by_day.clone();
        rule.by_month_day = spec.by_month_day;
        rule.by_set_pos = spec.by_set_pos;
        rule.end = match (spec.end_date, spec.occurrence_count) {
            (Some(until), Some(count)) => {
                debug!(%until, count, "Both end date and count supplied; end date wins");
                EndCondition::Until(until)
            }
            (Some(until), None) => EndCondition::Until(until),
            (None, Some(count)) => EndCondition::Count(count),
            (None, None) => EndCondition::Never,
        };
        rule.normalize();
        rule.validate().map_err(CoreError::InvalidSpec)?;

        let encoding = rrule::encode(&rule);
        debug!(frequency = %spec.frequency, %encoding, "Compiled recurrence rule");

        Ok(CompiledRule { rule, encoding })
    }

    /// Parses a canonical encoding back into a rule.
    pub fn parse(encoding: &str) -> Result<RecurrenceRule, CoreError> {
        rrule::parse(encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ten() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 0, 0).unwrap()
    }

    fn spec(frequency: Frequency) -> RecurrenceSpec {
        RecurrenceSpec::new(frequency, date(2024, 1, 1), ten())
    }

    #[test]
    fn test_compile_weekly() {
        let mut s = spec(Frequency::Weekly);
        s.by_day = vec![Weekday::Wed, Weekday::Mon, Weekday::Wed];

        let compiled = RuleCompiler::compile(&s).unwrap();
        assert_eq!(compiled.rule.freq, Freq::Weekly);
        assert_eq!(compiled.rule.by_day, vec![Weekday::Mon, Weekday::Wed]);
        assert_eq!(
            compiled.encoding,
            "DTSTART:20240101T100000\nRRULE:FREQ=WEEKLY;INTERVAL=1;BYDAY=MO,WE"
        );
    }

    #[test]
    fn test_biweekly_doubles_interval() {
        let mut s = spec(Frequency::Biweekly);
        s.interval = 3;
        let compiled = RuleCompiler::compile(&s).unwrap();
        assert_eq!(compiled.rule.freq, Freq::Weekly);
        assert_eq!(compiled.rule.interval, 6);
    }

    #[test]
    fn test_end_date_wins_over_count() {
        let mut s = spec(Frequency::Daily);
        s.end_date = Some(date(2024, 1, 10));
        s.occurrence_count = Some(3);

        let compiled = RuleCompiler::compile(&s).unwrap();
        assert_eq!(compiled.rule.end, EndCondition::Until(date(2024, 1, 10)));
        assert!(compiled.encoding.ends_with("UNTIL=20240110T235959"));
        assert!(!compiled.encoding.contains("COUNT"));
    }

    #[test]
    fn test_monthly_set_position() {
        let mut s = spec(Frequency::Monthly);
        s.by_day = vec![Weekday::Mon];
        s.by_set_pos = Some(1);
        s.occurrence_count = Some(6);

        let compiled = RuleCompiler::compile(&s).unwrap();
        assert_eq!(
            compiled.encoding,
            "DTSTART:20240101T100000\nRRULE:FREQ=MONTHLY;INTERVAL=1;BYDAY=MO;BYSETPOS=1;COUNT=6"
        );
    }

    #[test]
    fn test_drops_subsecond_precision() {
        let s = RecurrenceSpec::new(
            Frequency::Daily,
            date(2024, 1, 1),
            NaiveTime::from_hms_milli_opt(9, 30, 15, 250).unwrap(),
        );
        let compiled = RuleCompiler::compile(&s).unwrap();
        assert_eq!(compiled.rule.anchor.time(), NaiveTime::from_hms_opt(9, 30, 15).unwrap());
    }

    #[rstest]
    #[case::zero_interval(|s: &mut RecurrenceSpec| s.interval = 0)]
    #[case::interval_too_large(|s: &mut RecurrenceSpec| s.interval = 13)]
    #[case::month_day_on_weekly(|s: &mut RecurrenceSpec| {
        s.frequency = Frequency::Weekly;
        s.by_month_day = Some(5);
    })]
    #[case::month_day_zero(|s: &mut RecurrenceSpec| s.by_month_day = Some(0))]
    #[case::month_day_32(|s: &mut RecurrenceSpec| s.by_month_day = Some(32))]
    #[case::weekdays_on_daily(|s: &mut RecurrenceSpec| {
        s.frequency = Frequency::Daily;
        s.by_day = vec![Weekday::Mon];
    })]
    #[case::weekdays_and_month_day(|s: &mut RecurrenceSpec| {
        s.by_day = vec![Weekday::Mon];
        s.by_month_day = Some(3);
    })]
    #[case::set_pos_without_weekdays(|s: &mut RecurrenceSpec| s.by_set_pos = Some(1))]
    #[case::set_pos_zero(|s: &mut RecurrenceSpec| {
        s.by_day = vec![Weekday::Mon];
        s.by_set_pos = Some(0);
    })]
    #[case::set_pos_six(|s: &mut RecurrenceSpec| {
        s.by_day = vec![Weekday::Mon];
        s.by_set_pos = Some(6);
    })]
    #[case::set_pos_on_weekly(|s: &mut RecurrenceSpec| {
        s.frequency = Frequency::Weekly;
        s.by_day = vec![Weekday::Mon];
        s.by_set_pos = Some(1);
    })]
    #[case::count_zero(|s: &mut RecurrenceSpec| s.occurrence_count = Some(0))]
    #[case::count_too_large(|s: &mut RecurrenceSpec| s.occurrence_count = Some(366))]
    #[case::end_before_start(|s: &mut RecurrenceSpec| s.end_date = Some(date(2023, 12, 31)))]
    fn test_rejects_invalid_spec(#[case] mutate: fn(&mut RecurrenceSpec)) {
        let mut s = spec(Frequency::Monthly);
        mutate(&mut s);
        let err = RuleCompiler::compile(&s).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSpec(_)), "got {:?}", err);
    }

    #[test]
    fn test_end_date_on_start_date_is_allowed() {
        let mut s = spec(Frequency::Daily);
        s.end_date = Some(s.start_date);
        assert!(RuleCompiler::compile(&s).is_ok());
    }
}
