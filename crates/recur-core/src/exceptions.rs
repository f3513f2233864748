use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::CoreError;
use crate::models::{
    ExceptionAction, RecurrencePattern, SeriesException, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
use crate::recurrence::is_occurrence;

/// Exceptions of one series, keyed by original date.
///
/// At most one exception exists per date; inserting for an existing date
/// replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SeriesException>", into = "Vec<SeriesException>")]
pub struct ExceptionSet(BTreeMap<NaiveDate, SeriesException>);

impl ExceptionSet {
    pub fn get(&self, date: NaiveDate) -> Option<&SeriesException> {
        self.0.get(&date)
    }

    pub fn insert(&mut self, exception: SeriesException) -> Option<SeriesException> {
        self.0.insert(exception.original_date, exception)
    }

    pub fn remove(&mut self, date: NaiveDate) -> Option<SeriesException> {
        self.0.remove(&date)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeriesException> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Moves out every exception dated on or after `date`.
    pub fn split_off(&mut self, date: NaiveDate) -> ExceptionSet {
        ExceptionSet(self.0.split_off(&date))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&SeriesException) -> bool) {
        self.0.retain(|_, exception| keep(exception));
    }
}

impl From<Vec<SeriesException>> for ExceptionSet {
    fn from(exceptions: Vec<SeriesException>) -> Self {
        let mut set = ExceptionSet::default();
        for exception in exceptions {
            set.insert(exception);
        }
        set
    }
}

impl From<ExceptionSet> for Vec<SeriesException> {
    fn from(set: ExceptionSet) -> Self {
        set.0.into_values().collect()
    }
}

/// Validated mutation of a pattern's exception overlay.
pub struct ExceptionStore;

impl ExceptionStore {
    /// Adds an exception, replacing any existing one for the same original date.
    ///
    /// Returns the replaced exception. Fails with `IllegalState` on a cancelled
    /// series, `InvalidSpec` for an empty or out-of-range modify, and
    /// `InvalidOccurrence` when the rule has no occurrence on the date.
    pub fn add(
        pattern: &mut RecurrencePattern,
        exception: SeriesException,
    ) -> Result<Option<SeriesException>, CoreError> {
        if pattern.is_cancelled() {
            return Err(CoreError::IllegalState(format!(
                "series {} is cancelled",
                pattern.id
            )));
        }

        Self::validate_action(&exception.action)?;

        if !is_occurrence(&pattern.rule, exception.original_date) {
            return Err(CoreError::InvalidOccurrence(exception.original_date));
        }

        debug!(
            series_id = %pattern.id,
            date = %exception.original_date,
            kind = %exception.kind(),
            "Recording exception"
        );
        Ok(pattern.exceptions.insert(exception))
    }

    /// Removes the exception for `date`, restoring the base occurrence.
    pub fn remove(pattern: &mut RecurrencePattern, date: NaiveDate) -> Result<SeriesException, CoreError> {
        if pattern.is_cancelled() {
            return Err(CoreError::IllegalState(format!(
                "series {} is cancelled",
                pattern.id
            )));
        }

        pattern
            .exceptions
            .remove(date)
            .ok_or_else(|| CoreError::NotFound(format!("exception on {} for series {}", date, pattern.id)))
    }

    fn validate_action(action: &ExceptionAction) -> Result<(), CoreError> {
        match action {
            ExceptionAction::Skip | ExceptionAction::Reschedule { .. } => Ok(()),
            ExceptionAction::Modify(fields) => {
                if fields.is_empty() {
                    return Err(CoreError::InvalidSpec(
                        "modify exception must change at least one field".to_string(),
                    ));
                }
                if let Some(duration) = fields.duration_minutes {
                    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) {
                        return Err(CoreError::InvalidSpec(format!(
                            "duration must be between {} and {} minutes, got {}",
                            MIN_DURATION_MINUTES, MAX_DURATION_MINUTES, duration
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, ModifiedFields, RecurrenceSpec, SeriesStatus};
    use crate::recurrence::{rrule, RuleCompiler};
    use chrono::{NaiveTime, Utc};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weekly_pattern() -> RecurrencePattern {
        let spec = RecurrenceSpec::new(
            Frequency::Weekly,
            date(2024, 6, 3),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        let rule = RuleCompiler::compile(&spec).unwrap().rule;
        RecurrencePattern {
            id: Uuid::now_v7(),
            patient_id: "pat-1".to_string(),
            provider_id: "prov-1".to_string(),
            service_id: "svc-1".to_string(),
            service_name: "Facial".to_string(),
            room_id: None,
            notes: None,
            duration_minutes: 60,
            frequency: Frequency::Weekly,
            rrule: rrule::encode(&rule),
            rule,
            status: SeriesStatus::Active,
            exceptions: ExceptionSet::default(),
            next_occurrence: None,
            parent_series_id: None,
            revision: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn reschedule(to: NaiveDate) -> ExceptionAction {
        ExceptionAction::Reschedule {
            new_date: to,
            new_time: None,
            new_provider_id: None,
        }
    }

    #[test]
    fn test_skip_then_reschedule_leaves_one_exception() {
        let mut pattern = weekly_pattern();
        let first = ExceptionStore::add(
            &mut pattern,
            SeriesException::new(date(2024, 6, 10), ExceptionAction::Skip, None),
        )
        .unwrap();
        assert!(first.is_none());

        let replaced = ExceptionStore::add(
            &mut pattern,
            SeriesException::new(date(2024, 6, 10), reschedule(date(2024, 6, 12)), None),
        )
        .unwrap();

        assert_eq!(replaced.map(|e| e.action), Some(ExceptionAction::Skip));
        assert_eq!(pattern.exceptions.len(), 1);
        assert!(matches!(
            pattern.exceptions.get(date(2024, 6, 10)).unwrap().action,
            ExceptionAction::Reschedule { .. }
        ));
    }

    #[test]
    fn test_rejects_non_occurrence_date() {
        let mut pattern = weekly_pattern();
        let err = ExceptionStore::add(
            &mut pattern,
            SeriesException::new(date(2024, 6, 11), ExceptionAction::Skip, None),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOccurrence(d) if d == date(2024, 6, 11)));
        assert!(pattern.exceptions.is_empty());
    }

    #[test]
    fn test_rejects_cancelled_series() {
        let mut pattern = weekly_pattern();
        pattern.status = SeriesStatus::Cancelled;
        let err = ExceptionStore::add(
            &mut pattern,
            SeriesException::new(date(2024, 6, 10), ExceptionAction::Skip, None),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::IllegalState(_)));
    }

    #[test]
    fn test_rejects_empty_or_invalid_modify() {
        let mut pattern = weekly_pattern();
        let empty = SeriesException::new(
            date(2024, 6, 10),
            ExceptionAction::Modify(ModifiedFields::default()),
            None,
        );
        assert!(matches!(ExceptionStore::add(&mut pattern, empty), Err(CoreError::InvalidSpec(_))));

        let too_long = SeriesException::new(
            date(2024, 6, 10),
            ExceptionAction::Modify(ModifiedFields {
                duration_minutes: Some(600),
                ..Default::default()
            }),
            None,
        );
        assert!(matches!(ExceptionStore::add(&mut pattern, too_long), Err(CoreError::InvalidSpec(_))));
    }

    #[test]
    fn test_remove_exception() {
        let mut pattern = weekly_pattern();
        ExceptionStore::add(
            &mut pattern,
            SeriesException::new(date(2024, 6, 10), ExceptionAction::Skip, None),
        )
        .unwrap();

        let removed = ExceptionStore::remove(&mut pattern, date(2024, 6, 10)).unwrap();
        assert_eq!(removed.original_date, date(2024, 6, 10));
        assert!(matches!(
            ExceptionStore::remove(&mut pattern, date(2024, 6, 10)),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_split_off_partitions_by_date() {
        let mut set = ExceptionSet::default();
        for day in [3, 10, 17, 24] {
            set.insert(SeriesException::new(date(2024, 6, day), ExceptionAction::Skip, None));
        }
        let later = set.split_off(date(2024, 6, 17));
        assert_eq!(set.len(), 2);
        assert_eq!(later.len(), 2);
        assert!(later.get(date(2024, 6, 17)).is_some());
    }

    #[test]
    fn test_modified_fields_reject_unknown_keys() {
        let ok: Result<ExceptionAction, _> =
            serde_json::from_str(r#"{"type":"modify","notes":"Bring sunscreen"}"#);
        assert!(ok.is_ok());

        let unknown: Result<ExceptionAction, _> =
            serde_json::from_str(r#"{"type":"modify","color":"red"}"#);
        assert!(unknown.is_err());
    }
}
