use ::rrule::RRuleSet;
use chrono::{Duration, NaiveDate};
use tracing::{trace, warn};

use crate::exceptions::ExceptionSet;
use crate::models::{
    EndCondition, ExceptionAction, Occurrence, OccurrenceDefaults, OccurrenceStatus,
    RecurrencePattern,
};
use crate::recurrence::rrule;
use crate::recurrence::rule::RecurrenceRule;

/// Base dates of a rule, generated by the `rrule` crate.
///
/// Dates come out ascending, starting at the anchor. COUNT is tallied from the
/// anchor and UNTIL is inclusive. Iteration is lazy, so unbounded rules must be
/// cut off by the caller.
pub struct BaseDates {
    set: Option<RRuleSet>,
}

impl BaseDates {
    pub fn new(rule: &RecurrenceRule) -> Self {
        let set = match rrule::to_rrule_set(rule) {
            Ok(set) => Some(set),
            Err(e) => {
                warn!(error = %e, "Recurrence rule produced no dates");
                None
            }
        };
        Self { set }
    }

    /// Every base date of the rule.
    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.set
            .iter()
            .flat_map(|set| set.into_iter())
            .map(|dt| dt.naive_utc().date())
    }

    /// Base dates in `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> + '_ {
        self.iter()
            .skip_while(move |d| *d < start)
            .take_while(move |d| *d <= end)
    }
}

/// Expands a rule into concrete occurrences.
///
/// # Arguments
/// * `rule` - Compiled rule
/// * `defaults` - Appointment details copied onto each occurrence
/// * `exceptions` - Per-date overlay
/// * `window_start`, `window_end` - Inclusive bounds on original dates
/// * `include_skipped` - Whether skipped occurrences are returned (status skipped)
///
/// # Behavior
/// - Base dates follow [`BaseDates`]
/// - Each start is the base date at the anchor's wall-clock time
/// - Reschedule replaces date, time and provider; modify replaces service
///   details, duration, notes and provider
/// - Output is ordered by effective start, ties broken by original date
pub fn expand(
    rule: &RecurrenceRule,
    defaults: &OccurrenceDefaults,
    exceptions: &ExceptionSet,
    window_start: NaiveDate,
    window_end: NaiveDate,
    include_skipped: bool,
) -> Vec<Occurrence> {
    if window_end < window_start {
        return Vec::new();
    }

    let dates = BaseDates::new(rule);
    let mut keyed: Vec<(NaiveDate, Occurrence)> = overlay(
        rule,
        defaults,
        exceptions,
        dates.between(window_start, window_end),
        include_skipped,
    )
    .collect();

    keyed.sort_by(|a, b| (a.1.start, a.0).cmp(&(b.1.start, b.0)));
    trace!(count = keyed.len(), %window_start, %window_end, "Expanded occurrences");

    keyed.into_iter().map(|(_, occurrence)| occurrence).collect()
}

/// Applies the exception overlay to a stream of base dates without collecting.
///
/// Yields `(base date, occurrence)` pairs in base-date order.
pub fn overlay<'a>(
    rule: &'a RecurrenceRule,
    defaults: &'a OccurrenceDefaults,
    exceptions: &'a ExceptionSet,
    dates: impl Iterator<Item = NaiveDate> + 'a,
    include_skipped: bool,
) -> impl Iterator<Item = (NaiveDate, Occurrence)> + 'a {
    dates.filter_map(move |date| {
        build_occurrence(rule, defaults, exceptions, date, include_skipped).map(|occurrence| (date, occurrence))
    })
}

fn build_occurrence(
    rule: &RecurrenceRule,
    defaults: &OccurrenceDefaults,
    exceptions: &ExceptionSet,
    date: NaiveDate,
    include_skipped: bool,
) -> Option<Occurrence> {
    let start = date.and_time(rule.anchor.time());
    let mut occurrence = Occurrence {
        date,
        start,
        end: start + Duration::minutes(defaults.duration_minutes as i64),
        status: OccurrenceStatus::Scheduled,
        original_date: None,
        provider_id: defaults.provider_id.clone(),
        service_id: defaults.service_id.clone(),
        service_name: defaults.service_name.clone(),
        duration_minutes: defaults.duration_minutes,
        notes: defaults.notes.clone(),
        room_id: defaults.room_id.clone(),
    };

    let Some(exception) = exceptions.get(date) else {
        return Some(occurrence);
    };

    match &exception.action {
        ExceptionAction::Skip => {
            if !include_skipped {
                return None;
            }
            occurrence.status = OccurrenceStatus::Skipped;
        }
        ExceptionAction::Reschedule {
            new_date,
            new_time,
            new_provider_id,
        } => {
            let time = new_time.unwrap_or_else(|| rule.anchor.time());
            occurrence.date = *new_date;
            occurrence.start = new_date.and_time(time);
            occurrence.status = OccurrenceStatus::Rescheduled;
            if *new_date != date {
                occurrence.original_date = Some(date);
            }
            if let Some(provider) = new_provider_id {
                occurrence.provider_id = provider.clone();
            }
        }
        ExceptionAction::Modify(fields) => {
            if let Some(service_id) = &fields.service_id {
                occurrence.service_id = service_id.clone();
            }
            if let Some(service_name) = &fields.service_name {
                occurrence.service_name = service_name.clone();
            }
            if let Some(duration) = fields.duration_minutes {
                occurrence.duration_minutes = duration;
            }
            if let Some(notes) = &fields.notes {
                occurrence.notes = Some(notes.clone());
            }
            if let Some(provider) = &fields.provider_id {
                occurrence.provider_id = provider.clone();
            }
            occurrence.status = OccurrenceStatus::Modified;
        }
    }

    occurrence.end = occurrence.start + Duration::minutes(occurrence.duration_minutes as i64);
    Some(occurrence)
}

/// Whether the base rule schedules an occurrence on `date`.
pub fn is_occurrence(rule: &RecurrenceRule, date: NaiveDate) -> bool {
    first_on_or_after(rule, date) == Some(date)
}

/// First base date on or after `from`, ignoring exceptions.
pub fn first_on_or_after(rule: &RecurrenceRule, from: NaiveDate) -> Option<NaiveDate> {
    BaseDates::new(rule).iter().find(|d| *d >= from)
}

/// Number of base dates strictly before `date`.
pub fn count_before(rule: &RecurrenceRule, date: NaiveDate) -> usize {
    BaseDates::new(rule).iter().take_while(|d| *d < date).count()
}

/// Earliest non-skipped effective date on or after `on_or_after`.
///
/// Looks at original dates in the next `lookahead_days` plus earlier
/// occurrences that were rescheduled into that range.
pub fn next_occurrence(
    rule: &RecurrenceRule,
    exceptions: &ExceptionSet,
    on_or_after: NaiveDate,
    lookahead_days: u32,
) -> Option<NaiveDate> {
    let window_end = on_or_after
        .checked_add_signed(Duration::days(lookahead_days as i64))
        .unwrap_or(NaiveDate::MAX);

    let dates = BaseDates::new(rule);
    let scheduled = dates
        .between(on_or_after, window_end)
        .filter_map(|date| effective_date(exceptions, date));

    let moved_in = exceptions
        .iter()
        .filter(|e| e.original_date < on_or_after)
        .filter_map(|e| match &e.action {
            ExceptionAction::Reschedule { new_date, .. } => Some((e.original_date, *new_date)),
            _ => None,
        })
        .filter(|(_, new_date)| (on_or_after..=window_end).contains(new_date))
        .filter(|(original, _)| is_occurrence(rule, *original))
        .map(|(_, new_date)| new_date);

    scheduled.chain(moved_in).filter(|d| *d >= on_or_after).min()
}

fn effective_date(exceptions: &ExceptionSet, date: NaiveDate) -> Option<NaiveDate> {
    match exceptions.get(date).map(|e| &e.action) {
        Some(ExceptionAction::Skip) => None,
        Some(ExceptionAction::Reschedule { new_date, .. }) => Some(*new_date),
        _ => Some(date),
    }
}

impl RecurrenceRule {
    /// Date of the last occurrence, when the rule is bounded.
    pub fn final_date(&self) -> Option<NaiveDate> {
        match self.end {
            EndCondition::Never => None,
            EndCondition::Until(_) | EndCondition::Count(_) => BaseDates::new(self).iter().last(),
        }
    }
}

impl RecurrencePattern {
    /// Occurrences whose original date falls in `[start, end]`.
    /// A cancelled series has none.
    pub fn occurrences(&self, start: NaiveDate, end: NaiveDate, include_skipped: bool) -> Vec<Occurrence> {
        if self.is_cancelled() {
            return Vec::new();
        }
        expand(&self.rule, &self.defaults(), &self.exceptions, start, end, include_skipped)
    }
}
