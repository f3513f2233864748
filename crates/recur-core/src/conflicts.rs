use chrono::{Datelike, Duration, NaiveDate};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::directory::{AppointmentDirectory, WorkingHoursDirectory};
use crate::error::CoreError;
use crate::models::{
    Booking, BookingQuery, BookingStatus, Conflict, ConflictKind, EndCondition, Occurrence,
    RecurrencePattern, TimeRange,
};
use crate::recurrence::{overlay, BaseDates};

/// Checks a series' prospective occurrences against provider schedules and
/// existing bookings. Findings are advisory; nothing is ever mutated.
pub struct ConflictDetector {
    appointments: Arc<dyn AppointmentDirectory>,
    hours: Arc<dyn WorkingHoursDirectory>,
    /// Days checked ahead of the first date considered
    horizon_days: u32,
}

impl ConflictDetector {
    pub fn new(
        appointments: Arc<dyn AppointmentDirectory>,
        hours: Arc<dyn WorkingHoursDirectory>,
        horizon_days: u32,
    ) -> Self {
        Self {
            appointments,
            hours,
            horizon_days,
        }
    }

    /// Inclusive range of original dates the detector looks at.
    ///
    /// Never longer than `horizon_days`, whatever the rule's end condition.
    pub fn horizon(&self, pattern: &RecurrencePattern, from: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let start = from.max(pattern.start_date());
        let cap = start
            .checked_add_signed(Duration::days(self.horizon_days as i64))
            .unwrap_or(NaiveDate::MAX);
        let end = match pattern.rule.end {
            EndCondition::Until(until) => until.min(cap),
            EndCondition::Count(_) | EndCondition::Never => cap,
        };
        (start <= end).then_some((start, end))
    }

    /// Collects up to `max_conflicts` conflicts for occurrences on or after `from`.
    ///
    /// # Behavior
    /// - Occurrences are walked lazily in original-date order and the walk
    ///   stops once `max_conflicts` is reached
    /// - Skipped occurrences are ignored; reschedules and modifies are checked
    ///   with their effective time, duration and provider
    /// - A day outside the provider's working hours yields `outside_hours` and
    ///   no further checks for that occurrence
    /// - Then provider, patient and room bookings, ignoring cancelled bookings
    ///   and bookings generated from this same series; every overlapping
    ///   booking is its own conflict
    pub async fn check(
        &self,
        pattern: &RecurrencePattern,
        from: NaiveDate,
        max_conflicts: usize,
    ) -> Result<Vec<Conflict>, CoreError> {
        let mut conflicts = Vec::new();
        if max_conflicts == 0 || pattern.is_cancelled() {
            return Ok(conflicts);
        }
        let Some((start, end)) = self.horizon(pattern, from) else {
            return Ok(conflicts);
        };

        let dates = BaseDates::new(&pattern.rule);
        let defaults = pattern.defaults();
        let occurrences = overlay(
            &pattern.rule,
            &defaults,
            &pattern.exceptions,
            dates.between(start, end),
            false,
        );

        let mut checked = 0usize;
        for (_, occurrence) in occurrences {
            checked += 1;
            self.check_occurrence(pattern, &occurrence, &mut conflicts, max_conflicts)
                .await?;
            if conflicts.len() >= max_conflicts {
                break;
            }
        }
        debug!(series_id = %pattern.id, %start, %end, checked, "Checked occurrences for conflicts");

        if !conflicts.is_empty() {
            warn!(series_id = %pattern.id, count = conflicts.len(), "Scheduling conflicts found");
        }
        Ok(conflicts)
    }

    async fn check_occurrence(
        &self,
        pattern: &RecurrencePattern,
        occurrence: &Occurrence,
        conflicts: &mut Vec<Conflict>,
        max_conflicts: usize,
    ) -> Result<(), CoreError> {
        let weekday = occurrence.start.weekday();
        let hours = self.hours.query(&occurrence.provider_id, weekday).await?;
        let within_hours = hours.is_some_and(|h| h.contains(occurrence.start, occurrence.end));
        if !within_hours {
            let message = match hours {
                None => format!("Provider does not work on {}", weekday),
                Some(h) => format!(
                    "Appointment {}-{} is outside working hours {}-{}",
                    occurrence.start.format("%H:%M"),
                    occurrence.end.format("%H:%M"),
                    h.start.format("%H:%M"),
                    h.end.format("%H:%M")
                ),
            };
            conflicts.push(conflict(occurrence, ConflictKind::OutsideHours, None, message));
            return Ok(());
        }

        let range = TimeRange::new(occurrence.start, occurrence.end);
        let mut checks = vec![
            (ConflictKind::Provider, BookingQuery::Provider(occurrence.provider_id.clone())),
            (ConflictKind::Patient, BookingQuery::Patient(pattern.patient_id.clone())),
        ];
        if let Some(room) = &occurrence.room_id {
            checks.push((ConflictKind::Room, BookingQuery::Room(room.clone())));
        }

        for (kind, query) in checks {
            if conflicts.len() >= max_conflicts {
                break;
            }
            let bookings = self.appointments.query(&query, range).await?;
            let message = match kind {
                ConflictKind::Provider => "Provider has an overlapping appointment",
                ConflictKind::Patient => "Patient has an overlapping appointment",
                _ => "Room is already booked",
            };
            for booking in blocking(&bookings, pattern.id, range).take(max_conflicts - conflicts.len()) {
                conflicts.push(conflict(
                    occurrence,
                    kind,
                    Some(booking.id.clone()),
                    format!("{} at {}", message, booking.start.format("%Y-%m-%d %H:%M")),
                ));
            }
        }
        Ok(())
    }
}

fn blocking(bookings: &[Booking], series_id: Uuid, range: TimeRange) -> impl Iterator<Item = &Booking> {
    bookings.iter().filter(move |b| {
        b.status != BookingStatus::Cancelled
            && b.series_id != Some(series_id)
            && range.overlaps(b.start, b.end)
    })
}

fn conflict(occurrence: &Occurrence, kind: ConflictKind, booking_id: Option<String>, message: String) -> Conflict {
    Conflict {
        kind,
        date: occurrence.date,
        start: occurrence.start,
        end: occurrence.end,
        booking_id,
        message,
    }
}
