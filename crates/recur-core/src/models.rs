use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::exceptions::ExceptionSet;
use crate::recurrence::RecurrenceRule;

/// Shortest and longest appointment a series may book, in minutes.
pub const MIN_DURATION_MINUTES: u32 = 5;
pub const MAX_DURATION_MINUTES: u32 = 480;

// ============================================================================
// Enumerations
// ============================================================================

/// Repetition frequency as requested by the caller.
///
/// `Biweekly` only exists at this level: the compiled rule stores it as a
/// weekly rule with a doubled interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Biweekly => write!(f, "biweekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid frequency: {0}")]
pub struct ParseFrequencyError(String);

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SeriesStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl std::fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeriesStatus::Active => write!(f, "active"),
            SeriesStatus::Paused => write!(f, "paused"),
            SeriesStatus::Completed => write!(f, "completed"),
            SeriesStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid series status: {0}")]
pub struct ParseSeriesStatusError(String);

impl FromStr for SeriesStatus {
    type Err = ParseSeriesStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(SeriesStatus::Active),
            "paused" => Ok(SeriesStatus::Paused),
            "completed" => Ok(SeriesStatus::Completed),
            "cancelled" | "canceled" => Ok(SeriesStatus::Cancelled),
            _ => Err(ParseSeriesStatusError(s.to_string())),
        }
    }
}

/// Storage tag for [`ExceptionAction`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExceptionKind {
    Skip,
    Reschedule,
    Modify,
}

impl std::fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExceptionKind::Skip => write!(f, "skip"),
            ExceptionKind::Reschedule => write!(f, "reschedule"),
            ExceptionKind::Modify => write!(f, "modify"),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid exception type: {0}")]
pub struct ParseExceptionKindError(String);

impl FromStr for ExceptionKind {
    type Err = ParseExceptionKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(ExceptionKind::Skip),
            "reschedule" => Ok(ExceptionKind::Reschedule),
            "modify" => Ok(ExceptionKind::Modify),
            _ => Err(ParseExceptionKindError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceStatus {
    Scheduled,
    Skipped,
    Rescheduled,
    Modified,
}

impl std::fmt::Display for OccurrenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OccurrenceStatus::Scheduled => write!(f, "scheduled"),
            OccurrenceStatus::Skipped => write!(f, "skipped"),
            OccurrenceStatus::Rescheduled => write!(f, "rescheduled"),
            OccurrenceStatus::Modified => write!(f, "modified"),
        }
    }
}

// ============================================================================
// Exceptions
// ============================================================================

/// Per-occurrence overrides applied by a modify exception.
/// Unknown fields are rejected when deserializing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ModifiedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

impl ModifiedFields {
    pub fn is_empty(&self) -> bool {
        self.service_id.is_none()
            && self.service_name.is_none()
            && self.duration_minutes.is_none()
            && self.notes.is_none()
            && self.provider_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExceptionAction {
    /// Hide the occurrence
    Skip,
    /// Move the occurrence to another date, optionally another time or provider
    Reschedule {
        new_date: NaiveDate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_time: Option<NaiveTime>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_provider_id: Option<String>,
    },
    /// Keep date and time, override service details
    Modify(ModifiedFields),
}

impl ExceptionAction {
    pub fn kind(&self) -> ExceptionKind {
        match self {
            ExceptionAction::Skip => ExceptionKind::Skip,
            ExceptionAction::Reschedule { .. } => ExceptionKind::Reschedule,
            ExceptionAction::Modify(_) => ExceptionKind::Modify,
        }
    }
}

/// A deviation from the series pattern for one original occurrence date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeriesException {
    /// Date the base rule scheduled; the key of the overlay
    pub original_date: NaiveDate,
    pub action: ExceptionAction,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SeriesException {
    pub fn new(original_date: NaiveDate, action: ExceptionAction, reason: Option<String>) -> Self {
        Self {
            original_date,
            action,
            reason,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ExceptionKind {
        self.action.kind()
    }
}

// ============================================================================
// Series
// ============================================================================

/// How a series stops producing occurrences. A compiled rule never carries
/// both an end date and a count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum EndCondition {
    #[default]
    Never,
    /// Last date (inclusive) an occurrence may fall on
    Until(NaiveDate),
    /// Total occurrences, counted from the series start
    Count(u32),
}

/// A recurring appointment series: the base rule, its canonical encoding and
/// the exception overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrencePattern {
    pub id: Uuid,
    pub patient_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub service_name: String,
    pub room_id: Option<String>,
    pub notes: Option<String>,
    pub duration_minutes: u32,
    /// Frequency as requested; `rule` holds the normalized form
    pub frequency: Frequency,
    pub rule: RecurrenceRule,
    /// Canonical encoding of `rule`
    pub rrule: String,
    pub status: SeriesStatus,
    pub exceptions: ExceptionSet,
    pub next_occurrence: Option<NaiveDate>,
    /// Series this one was split from, if any
    pub parent_series_id: Option<Uuid>,
    /// Bumped by every successful save; zero means never persisted
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrencePattern {
    pub fn start_date(&self) -> NaiveDate {
        self.rule.anchor.date()
    }

    pub fn start_time(&self) -> NaiveTime {
        self.rule.anchor.time()
    }

    /// Values every occurrence starts from before exceptions are applied.
    pub fn defaults(&self) -> OccurrenceDefaults {
        OccurrenceDefaults {
            provider_id: self.provider_id.clone(),
            service_id: self.service_id.clone(),
            service_name: self.service_name.clone(),
            duration_minutes: self.duration_minutes,
            notes: self.notes.clone(),
            room_id: self.room_id.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == SeriesStatus::Cancelled
    }
}

/// Appointment details copied onto each expanded occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceDefaults {
    pub provider_id: String,
    pub service_id: String,
    pub service_name: String,
    pub duration_minutes: u32,
    pub notes: Option<String>,
    pub room_id: Option<String>,
}

/// One concrete instance of a series. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Occurrence {
    /// Effective date (differs from `original_date` when rescheduled)
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub status: OccurrenceStatus,
    /// Date the rule scheduled, present when a reschedule moved the occurrence
    pub original_date: Option<NaiveDate>,
    pub provider_id: String,
    pub service_id: String,
    pub service_name: String,
    pub duration_minutes: u32,
    pub notes: Option<String>,
    pub room_id: Option<String>,
}

impl Occurrence {
    pub fn is_visible(&self) -> bool {
        self.status != OccurrenceStatus::Skipped
    }
}

// ============================================================================
// Data Transfer Objects
// ============================================================================

/// Abstract repetition rule supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceSpec {
    pub frequency: Frequency,
    pub interval: u32,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    #[serde(default)]
    pub by_day: Vec<Weekday>,
    #[serde(default)]
    pub by_month_day: Option<u32>,
    #[serde(default)]
    pub by_set_pos: Option<i32>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub occurrence_count: Option<u32>,
}

impl RecurrenceSpec {
    /// A spec with no day selectors and no end condition.
    pub fn new(frequency: Frequency, start_date: NaiveDate, start_time: NaiveTime) -> Self {
        Self {
            frequency,
            interval: 1,
            start_date,
            start_time,
            by_day: Vec::new(),
            by_month_day: None,
            by_set_pos: None,
            end_date: None,
            occurrence_count: None,
        }
    }
}

/// Data required to create a new series
#[derive(Debug, Clone)]
pub struct NewSeriesData {
    pub patient_id: String,
    pub provider_id: String,
    pub service_id: String,
    pub service_name: String,
    pub duration_minutes: u32,
    pub room_id: Option<String>,
    pub notes: Option<String>,
    pub recurrence: RecurrenceSpec,
}

/// Conflict-check options for series creation.
#[derive(Debug, Clone, Copy)]
pub struct ConflictCheck {
    pub enabled: bool,
    pub max_conflicts: usize,
}

impl Default for ConflictCheck {
    fn default() -> Self {
        Self {
            enabled: true,
            max_conflicts: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatedSeries {
    pub pattern: RecurrencePattern,
    pub conflicts: Vec<Conflict>,
}

/// Changes to an existing series. `None` leaves a field untouched;
/// `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct SeriesUpdate {
    pub provider_id: Option<String>,
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub duration_minutes: Option<u32>,
    pub room_id: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub start_time: Option<NaiveTime>,
    /// Setting an end date clears any occurrence count
    pub end_date: Option<Option<NaiveDate>>,
    /// Setting a count clears any end date
    pub occurrence_count: Option<Option<u32>>,
}

impl SeriesUpdate {
    pub fn is_empty(&self) -> bool {
        self.provider_id.is_none()
            && self.service_id.is_none()
            && self.service_name.is_none()
            && self.duration_minutes.is_none()
            && self.room_id.is_none()
            && self.notes.is_none()
            && self.start_time.is_none()
            && self.end_date.is_none()
            && self.occurrence_count.is_none()
    }

    pub fn changes_schedule(&self) -> bool {
        self.start_time.is_some() || self.end_date.is_some() || self.occurrence_count.is_some()
    }
}

/// Which occurrences an update applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateScope {
    /// Rewrite the whole series in place
    All,
    /// Close the series before `from` and continue with a successor series
    AllFuture { from: NaiveDate },
}

impl std::fmt::Display for UpdateScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateScope::All => write!(f, "all"),
            UpdateScope::AllFuture { from } => write!(f, "all_future from {}", from),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The updated series, or the closed one when a split happened
    pub pattern: RecurrencePattern,
    /// Series spawned by a split
    pub successor: Option<RecurrencePattern>,
    /// Conflicts of the rewritten schedule (the successor's, after a split)
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone)]
pub struct RescheduleRequest {
    pub new_date: NaiveDate,
    pub new_time: Option<NaiveTime>,
    pub new_provider_id: Option<String>,
}

/// Filter and paging for series listings
#[derive(Debug, Clone)]
pub struct SeriesFilter {
    pub patient_id: Option<String>,
    pub provider_id: Option<String>,
    pub status: Option<SeriesStatus>,
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
}

impl Default for SeriesFilter {
    fn default() -> Self {
        Self {
            patient_id: None,
            provider_id: None,
            status: None,
            page: 1,
            limit: 20,
        }
    }
}

impl SeriesFilter {
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1) * self.limit
    }

    pub fn matches(&self, pattern: &RecurrencePattern) -> bool {
        self.patient_id.as_ref().map_or(true, |p| *p == pattern.patient_id)
            && self.provider_id.as_ref().map_or(true, |p| *p == pattern.provider_id)
            && self.status.map_or(true, |s| s == pattern.status)
    }
}

#[derive(Debug, Clone)]
pub struct SeriesPage {
    pub items: Vec<RecurrencePattern>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl SeriesPage {
    pub fn has_more(&self) -> bool {
        (self.page.saturating_sub(1) as u64) * self.limit as u64 + (self.items.len() as u64) < self.total
    }
}

// ============================================================================
// Conflict Detection Models
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Provider,
    OutsideHours,
    Patient,
    Room,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::Provider => write!(f, "provider"),
            ConflictKind::OutsideHours => write!(f, "outside_hours"),
            ConflictKind::Patient => write!(f, "patient"),
            ConflictKind::Room => write!(f, "room"),
        }
    }
}

/// A prospective occurrence that clashes with the directories.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Offending booking, absent for working-hours conflicts
    pub booking_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Scheduled,
    Cancelled,
}

/// An existing appointment as seen by the appointment directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: String,
    pub provider_id: String,
    pub patient_id: String,
    pub room_id: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub status: BookingStatus,
    /// Series the booking was generated from, if any
    pub series_id: Option<Uuid>,
}

impl Booking {
    pub fn new(
        id: impl Into<String>,
        provider_id: impl Into<String>,
        patient_id: impl Into<String>,
        start: NaiveDateTime,
        duration_minutes: u32,
    ) -> Self {
        Self {
            id: id.into(),
            provider_id: provider_id.into(),
            patient_id: patient_id.into(),
            room_id: None,
            start,
            end: start + Duration::minutes(duration_minutes as i64),
            status: BookingStatus::Scheduled,
            series_id: None,
        }
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }
}

/// Directory lookup key for bookings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingQuery {
    Provider(String),
    Patient(String),
    Room(String),
}

/// Half-open civil time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && start < self.end
    }
}

/// A provider's working interval on one weekday.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether `[start, end)` on a single day fits inside these hours.
    pub fn contains(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        start.date() == end.date() && start.time() >= self.start && end.time() <= self.end
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Scheduling policy knobs shared by the service and the CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Days checked for conflicts when a series has no end condition
    pub conflict_horizon_days: u32,
    /// Conflicts returned when the caller does not ask for a number
    pub default_max_conflicts: usize,
    /// Upper bound on requested conflicts
    pub max_conflicts_limit: usize,
    /// How far ahead the next occurrence is searched for
    pub next_occurrence_lookahead_days: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            conflict_horizon_days: 365,
            default_max_conflicts: 10,
            max_conflicts_limit: 100,
            next_occurrence_lookahead_days: 366,
        }
    }
}
