use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono_humanize::Humanize;
use comfy_table::{Attribute, Cell, Color, Row, Table};
use recur_core::models::{
    Conflict, ConflictKind, EndCondition, ExceptionAction, Occurrence, OccurrenceStatus,
    RecurrencePattern, SeriesException, SeriesStatus, WorkingHours,
};

use crate::util::short_id;

fn status_cell(status: SeriesStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        SeriesStatus::Active => cell.fg(Color::Green),
        SeriesStatus::Paused => cell.fg(Color::Yellow),
        SeriesStatus::Completed => cell.fg(Color::DarkGrey),
        SeriesStatus::Cancelled => cell.fg(Color::DarkGrey).add_attribute(Attribute::CrossedOut),
    }
}

/// Human summary of how a series ends.
pub fn describe_end(end: EndCondition) -> String {
    match end {
        EndCondition::Never => "never".to_string(),
        EndCondition::Until(date) => format!("on {}", date),
        EndCondition::Count(n) => format!("after {} occurrences", n),
    }
}

pub fn display_series(series: &[RecurrencePattern], today: NaiveDate) {
    if series.is_empty() {
        println!("No series found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Patient", "Provider", "Service", "Schedule", "Next", "Status"]);

    for pattern in series {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(&pattern.id)));
        row.add_cell(Cell::new(&pattern.patient_id));
        row.add_cell(Cell::new(&pattern.provider_id));

        let mut service = pattern.service_name.clone();
        if !pattern.exceptions.is_empty() {
            service.push_str(" ⚠");
        }
        row.add_cell(Cell::new(service));

        row.add_cell(Cell::new(format!(
            "{} at {}, ends {}",
            pattern.frequency,
            pattern.start_time().format("%H:%M"),
            describe_end(pattern.rule.end)
        )));

        let next_cell = match pattern.next_occurrence {
            Some(next) if next == today => Cell::new(next.to_string()).fg(Color::Yellow),
            Some(next) => Cell::new(next.to_string()),
            None => Cell::new("None").fg(Color::DarkGrey),
        };
        row.add_cell(next_cell);
        row.add_cell(status_cell(pattern.status));
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_occurrences(occurrences: &[Occurrence]) {
    if occurrences.is_empty() {
        println!("No occurrences in this window.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Date", "Time", "Service", "Provider", "Room", "Status"]);

    for occurrence in occurrences {
        let mut row = Row::new();
        let mut date = occurrence.date.format("%a %Y-%m-%d").to_string();
        if let Some(original) = occurrence.original_date {
            date.push_str(&format!(" (from {})", original));
        }
        row.add_cell(Cell::new(date));
        row.add_cell(Cell::new(format!(
            "{}-{}",
            occurrence.start.format("%H:%M"),
            occurrence.end.format("%H:%M")
        )));
        row.add_cell(Cell::new(&occurrence.service_name));
        row.add_cell(Cell::new(&occurrence.provider_id));
        row.add_cell(Cell::new(occurrence.room_id.as_deref().unwrap_or("None")));

        let status = Cell::new(occurrence.status.to_string());
        row.add_cell(match occurrence.status {
            OccurrenceStatus::Scheduled => status,
            OccurrenceStatus::Skipped => status.fg(Color::Red).add_attribute(Attribute::CrossedOut),
            OccurrenceStatus::Rescheduled => status.fg(Color::Blue),
            OccurrenceStatus::Modified => status.fg(Color::Yellow),
        });
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_exceptions(exceptions: &[&SeriesException]) {
    let mut table = Table::new();
    table.set_header(vec!["Date", "Type", "Details", "Reason", "Recorded"]);

    for exception in exceptions {
        let details = match &exception.action {
            ExceptionAction::Skip => String::new(),
            ExceptionAction::Reschedule {
                new_date,
                new_time,
                new_provider_id,
            } => {
                let mut details = format!("to {}", new_date);
                if let Some(time) = new_time {
                    details.push_str(&format!(" at {}", time.format("%H:%M")));
                }
                if let Some(provider) = new_provider_id {
                    details.push_str(&format!(" with {}", provider));
                }
                details
            }
            ExceptionAction::Modify(fields) => {
                let mut parts = Vec::new();
                if let Some(name) = &fields.service_name {
                    parts.push(format!("service {}", name));
                } else if let Some(service) = &fields.service_id {
                    parts.push(format!("service {}", service));
                }
                if let Some(duration) = fields.duration_minutes {
                    parts.push(format!("{} min", duration));
                }
                if let Some(provider) = &fields.provider_id {
                    parts.push(format!("provider {}", provider));
                }
                if let Some(notes) = &fields.notes {
                    parts.push(format!("notes \"{}\"", notes));
                }
                parts.join(", ")
            }
        };

        let kind = Cell::new(exception.kind().to_string());
        let kind = match exception.action {
            ExceptionAction::Skip => kind.fg(Color::Red),
            ExceptionAction::Reschedule { .. } => kind.fg(Color::Blue),
            ExceptionAction::Modify(_) => kind.fg(Color::Yellow),
        };

        table.add_row(vec![
            Cell::new(exception.original_date.to_string()),
            kind,
            Cell::new(details),
            Cell::new(exception.reason.as_deref().unwrap_or("")),
            Cell::new(humanize(exception.created_at)),
        ]);
    }

    println!("{table}");
}

pub fn display_conflicts(conflicts: &[Conflict]) {
    if conflicts.is_empty() {
        println!("No conflicts found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Date", "Time", "Kind", "Booking", "Details"]);

    for conflict in conflicts {
        let kind = Cell::new(conflict.kind.to_string());
        let kind = match conflict.kind {
            ConflictKind::OutsideHours => kind.fg(Color::Yellow),
            ConflictKind::Provider | ConflictKind::Patient | ConflictKind::Room => kind.fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(conflict.date.to_string()),
            Cell::new(format!("{}-{}", conflict.start.format("%H:%M"), conflict.end.format("%H:%M"))),
            kind,
            Cell::new(conflict.booking_id.as_deref().unwrap_or("")),
            Cell::new(&conflict.message),
        ]);
    }

    println!("{table}");
}

pub fn display_hours(provider: &str, hours: &[(Weekday, WorkingHours)]) {
    if hours.is_empty() {
        println!("No working hours set for {}.", provider);
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Day", "Start", "End"]);
    for (day, hours) in hours {
        table.add_row(vec![
            Cell::new(day.to_string()),
            Cell::new(hours.start.format("%H:%M").to_string()),
            Cell::new(hours.end.format("%H:%M").to_string()),
        ]);
    }

    println!("{table}");
}

pub fn humanize(at: DateTime<Utc>) -> String {
    at.humanize()
}
