use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SeriesCreated,
    SeriesUpdated,
    SeriesSplit,
    SeriesEnded,
    SeriesCompleted,
    SeriesPaused,
    SeriesResumed,
    SeriesCancelled,
    OccurrenceSkipped,
    OccurrenceRescheduled,
    OccurrenceModified,
    ExceptionRemoved,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuditAction::SeriesCreated => "series_created",
            AuditAction::SeriesUpdated => "series_updated",
            AuditAction::SeriesSplit => "series_split",
            AuditAction::SeriesEnded => "series_ended",
            AuditAction::SeriesCompleted => "series_completed",
            AuditAction::SeriesPaused => "series_paused",
            AuditAction::SeriesResumed => "series_resumed",
            AuditAction::SeriesCancelled => "series_cancelled",
            AuditAction::OccurrenceSkipped => "occurrence_skipped",
            AuditAction::OccurrenceRescheduled => "occurrence_rescheduled",
            AuditAction::OccurrenceModified => "occurrence_modified",
            AuditAction::ExceptionRemoved => "exception_removed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub series_id: Uuid,
    pub action: AuditAction,
    pub at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn new(series_id: Uuid, action: AuditAction, metadata: serde_json::Value) -> Self {
        Self {
            series_id,
            action,
            at: Utc::now(),
            metadata,
        }
    }
}

/// Receives lifecycle and exception events. Recording never fails the
/// operation that produced the event.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits audit events as `tracing` records on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            series_id = %event.series_id,
            action = %event.action,
            at = %event.at,
            metadata = %event.metadata,
            "Series event"
        );
    }
}

/// Keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.events().into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
