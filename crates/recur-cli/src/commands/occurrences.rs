use anyhow::Result;
use chrono::Duration;
use owo_colors::OwoColorize;
use recur_core::models::{ModifiedFields, RescheduleRequest};

use crate::cli::{ConflictsCommand, ModifyCommand, OccurrencesCommand, RescheduleCommand, SkipCommand, UnskipCommand};
use crate::parser::{parse_date, parse_time};
use crate::util::{resolve_series_id, short_id};
use crate::views::table::{display_conflicts, display_occurrences};
use crate::App;

const DEFAULT_WINDOW_DAYS: i64 = 30;

pub async fn list_occurrences(app: &App, command: OccurrencesCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let from = match command.from.as_deref() {
        Some(from) => parse_date(from, app.today)?,
        None => app.today,
    };
    let to = match command.to.as_deref() {
        Some(to) => parse_date(to, app.today)?,
        None => from + Duration::days(DEFAULT_WINDOW_DAYS),
    };

    let occurrences = app
        .service
        .list_occurrences(id, from, to, command.include_skipped)
        .await?;
    display_occurrences(&occurrences);
    Ok(())
}

pub async fn skip_occurrence(app: &App, command: SkipCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let date = parse_date(&command.on, app.today)?;
    app.service.skip_occurrence(id, date, command.reason).await?;

    println!(
        "{} Skipped occurrence on {} for series {}",
        "✓".green().bold(),
        date.to_string().cyan(),
        short_id(&id).yellow()
    );
    Ok(())
}

pub async fn reschedule_occurrence(app: &App, command: RescheduleCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let date = parse_date(&command.on, app.today)?;
    let request = RescheduleRequest {
        new_date: parse_date(&command.to, app.today)?,
        new_time: command.at.as_deref().map(parse_time).transpose()?,
        new_provider_id: command.provider,
    };
    let new_date = request.new_date;
    app.service
        .reschedule_occurrence(id, date, request, command.reason)
        .await?;

    println!(
        "{} Moved occurrence on {} to {} for series {}",
        "✓".green().bold(),
        date.to_string().cyan(),
        new_date.to_string().cyan(),
        short_id(&id).yellow()
    );
    Ok(())
}

pub async fn modify_occurrence(app: &App, command: ModifyCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let date = parse_date(&command.on, app.today)?;
    let fields = ModifiedFields {
        service_id: command.service,
        service_name: command.service_name,
        duration_minutes: command.duration,
        notes: command.notes,
        provider_id: command.provider,
    };
    app.service.modify_occurrence(id, date, fields, command.reason).await?;

    println!(
        "{} Modified occurrence on {} for series {}",
        "✓".green().bold(),
        date.to_string().cyan(),
        short_id(&id).yellow()
    );
    Ok(())
}

pub async fn remove_exception(app: &App, command: UnskipCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let date = parse_date(&command.on, app.today)?;
    app.service.remove_exception(id, date).await?;

    println!(
        "{} Restored occurrence on {} for series {}",
        "✓".green().bold(),
        date.to_string().cyan(),
        short_id(&id).yellow()
    );
    Ok(())
}

pub async fn check_conflicts(app: &App, command: ConflictsCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let conflicts = app.service.check_conflicts(id, command.max).await?;
    display_conflicts(&conflicts);
    Ok(())
}
