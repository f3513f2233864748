use chrono::{Duration, NaiveDate, NaiveTime};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEvent, AuditSink, TracingAuditSink};
use crate::conflicts::ConflictDetector;
use crate::directory::{AppointmentDirectory, WorkingHoursDirectory};
use crate::error::CoreError;
use crate::exceptions::{ExceptionSet, ExceptionStore};
use crate::lifecycle::{ensure_not_cancelled, Transition};
use crate::models::{
    Conflict, ConflictCheck, CreatedSeries, EndCondition, ExceptionAction, ModifiedFields,
    NewSeriesData, Occurrence, RecurrencePattern, RescheduleRequest, SchedulingConfig,
    SeriesException, SeriesFilter, SeriesPage, SeriesStatus, SeriesUpdate, UpdateOutcome,
    UpdateScope, MAX_DURATION_MINUTES, MIN_DURATION_MINUTES,
};
use crate::recurrence::{count_before, first_on_or_after, is_occurrence, next_occurrence, rrule, RuleCompiler};
use crate::repository::SeriesRepository;
use crate::timezone::{Clock, SystemClock};

/// Largest page size for series listings.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Per-series async locks so that mutations of one series never interleave.
#[derive(Debug, Default)]
pub struct SeriesLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SeriesLocks {
    pub async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop locks nobody holds or waits on.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Orchestrates compilation, persistence, exceptions, lifecycle transitions
/// and conflict detection for recurring series.
pub struct SeriesService {
    repo: Arc<dyn SeriesRepository>,
    detector: ConflictDetector,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
    locks: SeriesLocks,
}

impl SeriesService {
    pub fn new(
        repo: Arc<dyn SeriesRepository>,
        appointments: Arc<dyn AppointmentDirectory>,
        hours: Arc<dyn WorkingHoursDirectory>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            repo,
            detector: ConflictDetector::new(appointments, hours, config.conflict_horizon_days),
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock::utc()),
            config,
            locks: SeriesLocks::default(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn get_series(&self, id: Uuid) -> Result<RecurrencePattern, CoreError> {
        self.repo
            .load(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("series {}", id)))
    }

    pub async fn list_series(&self, filter: &SeriesFilter) -> Result<SeriesPage, CoreError> {
        if filter.page == 0 {
            return Err(CoreError::InvalidSpec("page numbers start at 1".to_string()));
        }
        if filter.limit == 0 || filter.limit > MAX_PAGE_SIZE {
            return Err(CoreError::InvalidSpec(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        self.repo.list(filter).await
    }

    /// Resolves a full id or a unique id prefix.
    pub async fn resolve_id(&self, input: &str) -> Result<Uuid, CoreError> {
        if let Ok(id) = Uuid::parse_str(input) {
            return Ok(id);
        }
        if input.len() < 2 {
            return Err(CoreError::InvalidSpec(
                "Short ID must be at least 2 characters long.".to_string(),
            ));
        }

        let mut matches = self.repo.find_by_id_prefix(input).await?;
        match matches.len() {
            0 => Err(CoreError::NotFound(format!("no series with ID prefix '{}'", input))),
            1 => Ok(matches.remove(0).id),
            _ => Err(CoreError::AmbiguousId(
                matches.into_iter().map(|p| p.id.to_string()).collect(),
            )),
        }
    }

    /// Occurrences whose original date falls in `[start, end]`.
    pub async fn list_occurrences(
        &self,
        id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        include_skipped: bool,
    ) -> Result<Vec<Occurrence>, CoreError> {
        if end < start {
            return Err(CoreError::InvalidSpec(format!(
                "window end {} is before window start {}",
                end, start
            )));
        }
        let pattern = self.get_series(id).await?;
        Ok(pattern.occurrences(start, end, include_skipped))
    }

    /// Conflicts of the remaining schedule, from today on.
    pub async fn check_conflicts(&self, id: Uuid, max_conflicts: Option<usize>) -> Result<Vec<Conflict>, CoreError> {
        let max = self.conflict_cap(max_conflicts.unwrap_or(self.config.default_max_conflicts))?;
        let pattern = self.get_series(id).await?;
        self.detector.check(&pattern, self.clock.today(), max).await
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Compiles and stores a new series.
    ///
    /// Conflicts are reported alongside the created series and never prevent
    /// creation.
    pub async fn create_series(&self, data: NewSeriesData, check: ConflictCheck) -> Result<CreatedSeries, CoreError> {
        validate_required("patient id", &data.patient_id)?;
        validate_required("provider id", &data.provider_id)?;
        validate_required("service id", &data.service_id)?;
        validate_required("service name", &data.service_name)?;
        validate_duration(data.duration_minutes)?;
        let max_conflicts = if check.enabled {
            Some(self.conflict_cap(check.max_conflicts)?)
        } else {
            None
        };

        let compiled = RuleCompiler::compile(&data.recurrence)?;
        let now = self.clock.now();
        let mut pattern = RecurrencePattern {
            id: Uuid::now_v7(),
            patient_id: data.patient_id,
            provider_id: data.provider_id,
            service_id: data.service_id,
            service_name: data.service_name,
            room_id: data.room_id,
            notes: data.notes,
            duration_minutes: data.duration_minutes,
            frequency: data.recurrence.frequency,
            rule: compiled.rule,
            rrule: compiled.encoding,
            status: SeriesStatus::Active,
            exceptions: ExceptionSet::default(),
            next_occurrence: None,
            parent_series_id: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        };
        self.refresh(&mut pattern);

        let conflicts = match max_conflicts {
            Some(max) => self.detector.check(&pattern, self.clock.today(), max).await?,
            None => Vec::new(),
        };

        let pattern = self.repo.save(pattern).await?;
        info!(series_id = %pattern.id, rrule = %pattern.rrule, conflicts = conflicts.len(), "Created series");
        self.record(
            pattern.id,
            AuditAction::SeriesCreated,
            json!({
                "frequency": pattern.frequency,
                "rrule": pattern.rrule,
                "patient_id": pattern.patient_id,
                "provider_id": pattern.provider_id,
                "conflicts": conflicts.len(),
            }),
        );

        Ok(CreatedSeries { pattern, conflicts })
    }

    // ------------------------------------------------------------------
    // Exceptions
    // ------------------------------------------------------------------

    pub async fn skip_occurrence(
        &self,
        id: Uuid,
        date: NaiveDate,
        reason: Option<String>,
    ) -> Result<RecurrencePattern, CoreError> {
        self.add_exception(id, SeriesException::new(date, ExceptionAction::Skip, reason), AuditAction::OccurrenceSkipped)
            .await
    }

    pub async fn reschedule_occurrence(
        &self,
        id: Uuid,
        date: NaiveDate,
        request: RescheduleRequest,
        reason: Option<String>,
    ) -> Result<RecurrencePattern, CoreError> {
        if let Some(provider) = &request.new_provider_id {
            validate_required("provider id", provider)?;
        }
        let action = ExceptionAction::Reschedule {
            new_date: request.new_date,
            new_time: request.new_time,
            new_provider_id: request.new_provider_id,
        };
        self.add_exception(id, SeriesException::new(date, action, reason), AuditAction::OccurrenceRescheduled)
            .await
    }

    pub async fn modify_occurrence(
        &self,
        id: Uuid,
        date: NaiveDate,
        fields: ModifiedFields,
        reason: Option<String>,
    ) -> Result<RecurrencePattern, CoreError> {
        self.add_exception(
            id,
            SeriesException::new(date, ExceptionAction::Modify(fields), reason),
            AuditAction::OccurrenceModified,
        )
        .await
    }

    /// Removes the exception on `date`, restoring the base occurrence.
    pub async fn remove_exception(&self, id: Uuid, date: NaiveDate) -> Result<RecurrencePattern, CoreError> {
        let _guard = self.locks.acquire(id).await;
        let mut pattern = self.get_series(id).await?;
        let removed = ExceptionStore::remove(&mut pattern, date)?;
        self.touch(&mut pattern);

        let pattern = self.repo.save(pattern).await?;
        self.record(
            id,
            AuditAction::ExceptionRemoved,
            json!({ "original_date": date, "type": removed.kind() }),
        );
        Ok(pattern)
    }

    async fn add_exception(
        &self,
        id: Uuid,
        exception: SeriesException,
        action: AuditAction,
    ) -> Result<RecurrencePattern, CoreError> {
        let _guard = self.locks.acquire(id).await;
        let mut pattern = self.get_series(id).await?;

        let metadata = json!({
            "original_date": exception.original_date,
            "exception": exception.action,
            "reason": exception.reason,
        });
        let replaced = ExceptionStore::add(&mut pattern, exception)?;
        self.touch(&mut pattern);

        let pattern = self.repo.save(pattern).await?;
        if let Some(previous) = replaced {
            debug!(series_id = %id, date = %previous.original_date, kind = %previous.kind(), "Replaced exception");
        }
        self.record(id, action, metadata);
        Ok(pattern)
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Applies `changes` to the whole series or to the part from a date on.
    ///
    /// # Behavior
    /// - `All` rewrites the series in place
    /// - `AllFuture { from }` closes the series the day before the first
    ///   occurrence on or after `from` and starts a successor series there with
    ///   the changes applied; exceptions move with their dates and a COUNT
    ///   carries over what remains. When `from` is not after the series start
    ///   the update happens in place.
    pub async fn update_series(
        &self,
        id: Uuid,
        changes: SeriesUpdate,
        scope: UpdateScope,
    ) -> Result<UpdateOutcome, CoreError> {
        if changes.is_empty() {
            return Err(CoreError::InvalidSpec("no changes supplied".to_string()));
        }
        validate_update(&changes)?;

        let _guard = self.locks.acquire(id).await;
        let pattern = self.get_series(id).await?;
        ensure_not_cancelled(&pattern)?;

        match scope {
            UpdateScope::AllFuture { from } if from > pattern.start_date() => {
                self.split_series(pattern, changes, from).await
            }
            _ => self.update_in_place(pattern, changes).await,
        }
    }

    async fn update_in_place(
        &self,
        mut pattern: RecurrencePattern,
        changes: SeriesUpdate,
    ) -> Result<UpdateOutcome, CoreError> {
        let fields = changed_fields(&changes);
        apply_changes(&mut pattern, &changes)?;
        self.touch(&mut pattern);

        let conflicts = self.recheck(&pattern, &changes).await?;
        let pattern = self.repo.save(pattern).await?;
        info!(series_id = %pattern.id, rrule = %pattern.rrule, "Updated series");
        self.record(
            pattern.id,
            AuditAction::SeriesUpdated,
            json!({ "scope": "all", "fields": fields, "rrule": pattern.rrule }),
        );

        Ok(UpdateOutcome {
            pattern,
            successor: None,
            conflicts,
        })
    }

    async fn split_series(
        &self,
        pattern: RecurrencePattern,
        changes: SeriesUpdate,
        from: NaiveDate,
    ) -> Result<UpdateOutcome, CoreError> {
        let boundary = first_on_or_after(&pattern.rule, from).ok_or_else(|| {
            CoreError::InvalidSpec(format!("series has no occurrences on or after {}", from))
        })?;
        if boundary == pattern.start_date() {
            return self.update_in_place(pattern, changes).await;
        }

        let fields = changed_fields(&changes);
        let now = self.clock.now();
        let mut closed = pattern;
        let mut successor = closed.clone();

        // Successor: same rule re-anchored at the boundary occurrence.
        successor.id = Uuid::now_v7();
        successor.parent_series_id = Some(closed.id);
        successor.revision = 0;
        successor.created_at = now;
        successor.rule.anchor = boundary.and_time(closed.start_time());
        if let EndCondition::Count(n) = closed.rule.end {
            let used = u32::try_from(count_before(&closed.rule, boundary)).unwrap_or(n);
            successor.rule.end = EndCondition::Count(n.saturating_sub(used));
        }
        successor.exceptions = closed.exceptions.split_off(boundary);
        apply_changes(&mut successor, &changes)?;
        let successor_rule = successor.rule.clone();
        successor.exceptions.retain(|e| is_occurrence(&successor_rule, e.original_date));
        self.touch(&mut successor);

        // Closed series: ends the day before the boundary.
        let last_day = boundary - Duration::days(1);
        closed.rule.end = EndCondition::Until(last_day);
        closed.rule.validate().map_err(CoreError::InvalidSpec)?;
        closed.rrule = rrule::encode(&closed.rule);
        if last_day < self.clock.today() {
            closed.status = Transition::Complete.apply(closed.status)?;
        }
        self.touch(&mut closed);

        let conflicts = self.recheck(&successor, &changes).await?;
        let mut saved = self.repo.save_all(vec![closed, successor]).await?.into_iter();
        let (closed, successor) = match (saved.next(), saved.next()) {
            (Some(closed), Some(successor)) => (closed, successor),
            _ => return Err(CoreError::IllegalState("split did not persist both series".to_string())),
        };

        info!(series_id = %closed.id, successor_id = %successor.id, %boundary, "Split series");
        self.record(
            closed.id,
            AuditAction::SeriesSplit,
            json!({
                "scope": "all_future",
                "from": from,
                "boundary": boundary,
                "successor_id": successor.id,
                "fields": fields,
            }),
        );

        Ok(UpdateOutcome {
            pattern: closed,
            successor: Some(successor),
            conflicts,
        })
    }

    /// Schedule changes are re-checked for conflicts; detail-only changes are not.
    async fn recheck(&self, pattern: &RecurrencePattern, changes: &SeriesUpdate) -> Result<Vec<Conflict>, CoreError> {
        let schedule_changed = changes.changes_schedule()
            || changes.provider_id.is_some()
            || changes.duration_minutes.is_some()
            || changes.room_id.is_some();
        if !schedule_changed {
            return Ok(Vec::new());
        }
        self.detector
            .check(pattern, self.clock.today(), self.config.default_max_conflicts)
            .await
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Ends the series on `end_date`, completing it when nothing remains.
    pub async fn end_series(&self, id: Uuid, end_date: NaiveDate) -> Result<RecurrencePattern, CoreError> {
        let _guard = self.locks.acquire(id).await;
        let mut pattern = self.get_series(id).await?;
        ensure_not_cancelled(&pattern)?;
        if pattern.status == SeriesStatus::Completed {
            return Err(CoreError::IllegalState(format!("series {} is already completed", id)));
        }

        pattern.rule.end = EndCondition::Until(end_date);
        pattern.rule.validate().map_err(CoreError::InvalidSpec)?;
        pattern.rrule = rrule::encode(&pattern.rule);

        let today = self.clock.today();
        let completed = end_date < today || first_on_or_after(&pattern.rule, today).is_none();
        if completed {
            pattern.status = Transition::Complete.apply(pattern.status)?;
        }
        self.touch(&mut pattern);

        let pattern = self.repo.save(pattern).await?;
        info!(series_id = %id, %end_date, completed, "Ended series");
        let action = if completed {
            AuditAction::SeriesCompleted
        } else {
            AuditAction::SeriesEnded
        };
        self.record(id, action, json!({ "end_date": end_date, "rrule": pattern.rrule }));
        Ok(pattern)
    }

    pub async fn cancel_series(&self, id: Uuid, reason: Option<String>) -> Result<RecurrencePattern, CoreError> {
        self.transition(id, Transition::Cancel, AuditAction::SeriesCancelled, json!({ "reason": reason }))
            .await
    }

    pub async fn pause_series(&self, id: Uuid) -> Result<RecurrencePattern, CoreError> {
        self.transition(id, Transition::Pause, AuditAction::SeriesPaused, json!({}))
            .await
    }

    pub async fn resume_series(&self, id: Uuid) -> Result<RecurrencePattern, CoreError> {
        self.transition(id, Transition::Resume, AuditAction::SeriesResumed, json!({}))
            .await
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: Transition,
        action: AuditAction,
        mut metadata: serde_json::Value,
    ) -> Result<RecurrencePattern, CoreError> {
        let _guard = self.locks.acquire(id).await;
        let mut pattern = self.get_series(id).await?;
        let from = pattern.status;
        pattern.status = transition.apply(from)?;
        self.touch(&mut pattern);

        let pattern = self.repo.save(pattern).await?;
        info!(series_id = %id, %from, to = %pattern.status, "Series {}", transition);
        if let Some(map) = metadata.as_object_mut() {
            map.insert("from".to_string(), json!(from));
            map.insert("to".to_string(), json!(pattern.status));
        }
        self.record(id, action, metadata);
        Ok(pattern)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Recomputes the derived next occurrence. Only active series have one.
    fn refresh(&self, pattern: &mut RecurrencePattern) {
        pattern.next_occurrence = match pattern.status {
            SeriesStatus::Active => next_occurrence(
                &pattern.rule,
                &pattern.exceptions,
                self.clock.today(),
                self.config.next_occurrence_lookahead_days,
            ),
            _ => None,
        };
    }

    fn touch(&self, pattern: &mut RecurrencePattern) {
        self.refresh(pattern);
        pattern.updated_at = self.clock.now();
    }

    fn conflict_cap(&self, requested: usize) -> Result<usize, CoreError> {
        if requested == 0 || requested > self.config.max_conflicts_limit {
            return Err(CoreError::InvalidSpec(format!(
                "max conflicts must be between 1 and {}",
                self.config.max_conflicts_limit
            )));
        }
        Ok(requested)
    }

    fn record(&self, series_id: Uuid, action: AuditAction, metadata: serde_json::Value) {
        self.audit.record(AuditEvent::new(series_id, action, metadata));
    }
}

fn validate_required(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidSpec(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_duration(minutes: u32) -> Result<(), CoreError> {
    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(CoreError::InvalidSpec(format!(
            "duration must be between {} and {} minutes, got {}",
            MIN_DURATION_MINUTES, MAX_DURATION_MINUTES, minutes
        )));
    }
    Ok(())
}

fn validate_update(changes: &SeriesUpdate) -> Result<(), CoreError> {
    if let Some(provider) = &changes.provider_id {
        validate_required("provider id", provider)?;
    }
    if let Some(service) = &changes.service_id {
        validate_required("service id", service)?;
    }
    if let Some(name) = &changes.service_name {
        validate_required("service name", name)?;
    }
    if let Some(duration) = changes.duration_minutes {
        validate_duration(duration)?;
    }
    Ok(())
}

fn changed_fields(changes: &SeriesUpdate) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if changes.provider_id.is_some() {
        fields.push("provider_id");
    }
    if changes.service_id.is_some() {
        fields.push("service_id");
    }
    if changes.service_name.is_some() {
        fields.push("service_name");
    }
    if changes.duration_minutes.is_some() {
        fields.push("duration_minutes");
    }
    if changes.room_id.is_some() {
        fields.push("room_id");
    }
    if changes.notes.is_some() {
        fields.push("notes");
    }
    if changes.start_time.is_some() {
        fields.push("start_time");
    }
    if changes.end_date.is_some() {
        fields.push("end_date");
    }
    if changes.occurrence_count.is_some() {
        fields.push("occurrence_count");
    }
    fields
}

/// Applies changes to a pattern and regenerates its encoding.
///
/// An end date replaces any count and a count replaces any end date; when both
/// are supplied the end date wins.
fn apply_changes(pattern: &mut RecurrencePattern, changes: &SeriesUpdate) -> Result<(), CoreError> {
    if let Some(provider) = &changes.provider_id {
        pattern.provider_id = provider.clone();
    }
    if let Some(service) = &changes.service_id {
        pattern.service_id = service.clone();
    }
    if let Some(name) = &changes.service_name {
        pattern.service_name = name.clone();
    }
    if let Some(duration) = changes.duration_minutes {
        pattern.duration_minutes = duration;
    }
    if let Some(room) = &changes.room_id {
        pattern.room_id = room.clone();
    }
    if let Some(notes) = &changes.notes {
        pattern.notes = notes.clone();
    }
    if let Some(time) = changes.start_time {
        pattern.rule.anchor = pattern.start_date().and_time(strip_subseconds(time));
    }

    if let Some(count) = changes.occurrence_count {
        match count {
            Some(n) => pattern.rule.end = EndCondition::Count(n),
            None if matches!(pattern.rule.end, EndCondition::Count(_)) => pattern.rule.end = EndCondition::Never,
            None => {}
        }
    }
    if let Some(end_date) = changes.end_date {
        match end_date {
            Some(date) => pattern.rule.end = EndCondition::Until(date),
            None if matches!(pattern.rule.end, EndCondition::Until(_)) => pattern.rule.end = EndCondition::Never,
            None => {}
        }
    }

    pattern.rule.validate().map_err(CoreError::InvalidSpec)?;
    pattern.rrule = rrule::encode(&pattern.rule);
    Ok(())
}

fn strip_subseconds(time: NaiveTime) -> NaiveTime {
    use chrono::Timelike;
    time.with_nanosecond(0).unwrap_or(time)
}
