use anyhow::{anyhow, Result};
use chrono::Duration;
use dialoguer::Confirm;
use owo_colors::{OwoColorize, Style};
use recur_core::models::{
    ConflictCheck, NewSeriesData, RecurrenceSpec, SeriesFilter, SeriesUpdate, UpdateScope,
};

use crate::cli::{
    CancelCommand, CreateCommand, EndCommand, IdCommand, ListCommand, ScopeArg, ShowCommand,
    UpdateCommand,
};
use crate::parser::{parse_date, parse_time, parse_weekdays};
use crate::util::{nullable, resolve_series_id, short_id};
use crate::views::table::{describe_end, display_conflicts, display_exceptions, display_occurrences, display_series};
use crate::App;

pub async fn create_series(app: &App, command: CreateCommand) -> Result<()> {
    let mut recurrence = RecurrenceSpec::new(
        command.every.into(),
        parse_date(&command.start, app.today)?,
        parse_time(&command.at)?,
    );
    recurrence.interval = command.interval;
    recurrence.by_day = command.on.as_deref().map(parse_weekdays).transpose()?.unwrap_or_default();
    recurrence.by_month_day = command.month_day;
    recurrence.by_set_pos = command.set_pos;
    recurrence.end_date = command.until.as_deref().map(|d| parse_date(d, app.today)).transpose()?;
    recurrence.occurrence_count = command.count;

    let data = NewSeriesData {
        patient_id: command.patient,
        provider_id: command.provider,
        service_id: command.service,
        service_name: command.service_name,
        duration_minutes: command.duration,
        room_id: command.room,
        notes: command.notes,
        recurrence,
    };
    let check = ConflictCheck {
        enabled: !command.no_conflict_check,
        max_conflicts: command
            .max_conflicts
            .unwrap_or(app.config.scheduling.default_max_conflicts),
    };

    let created = app.service.create_series(data, check).await?;
    let pattern = &created.pattern;

    let success_style = Style::new().green().bold();
    let info_style = Style::new().blue();
    println!(
        "{} Created series: {} for {}",
        "✓".style(success_style),
        pattern.service_name.bright_white().bold(),
        pattern.patient_id
    );
    println!("  {} Series ID: {}", "→".style(info_style), pattern.id.to_string().yellow());
    println!("  {} Rule: {}", "→".style(info_style), pattern.rrule.replace('\n', " ").green());
    match pattern.next_occurrence {
        Some(next) => println!("  {} Next occurrence: {}", "→".style(info_style), next.to_string().cyan()),
        None => println!("  {} No upcoming occurrences", "→".style(info_style)),
    }

    if !created.conflicts.is_empty() {
        println!(
            "\n{} {} conflict(s) found; the series was created anyway:",
            "⚠".yellow(),
            created.conflicts.len()
        );
        display_conflicts(&created.conflicts);
    }

    Ok(())
}

pub async fn list_series(app: &App, command: ListCommand) -> Result<()> {
    let filter = SeriesFilter {
        patient_id: command.patient,
        provider_id: command.provider,
        status: command.status.map(Into::into),
        page: command.page,
        limit: command.limit,
    };
    let page = app.service.list_series(&filter).await?;

    display_series(&page.items, app.today);
    if page.total > 0 {
        println!(
            "Page {} ({} series total){}",
            page.page,
            page.total,
            if page.has_more() { ", more available with --page" } else { "" }
        );
    }
    Ok(())
}

pub async fn show_series(app: &App, command: ShowCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let pattern = app.service.get_series(id).await?;

    println!("{}", "Series Information".blue().bold());
    println!("Series ID: {}", pattern.id.yellow());
    println!("Patient: {}", pattern.patient_id.cyan());
    println!("Provider: {}", pattern.provider_id.cyan());
    println!("Service: {} ({})", pattern.service_name, pattern.service_id);
    println!("Duration: {} min", pattern.duration_minutes);
    if let Some(room) = &pattern.room_id {
        println!("Room: {}", room);
    }
    if let Some(notes) = &pattern.notes {
        println!("Notes: {}", notes);
    }
    println!("Frequency: {}", pattern.frequency);
    println!("Rule: {}", pattern.rrule.replace('\n', " ").green());
    println!("Ends: {}", describe_end(pattern.rule.end));
    println!("Status: {}", pattern.status);
    if let Some(parent) = pattern.parent_series_id {
        println!("Continues series: {}", short_id(&parent).yellow());
    }
    println!("Created: {}", pattern.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();

    if !pattern.exceptions.is_empty() {
        println!("{} ({} exceptions)", "Exceptions".yellow().bold(), pattern.exceptions.len());
        let exceptions: Vec<_> = pattern.exceptions.iter().collect();
        display_exceptions(&exceptions);
        println!();
    }

    println!("{}", format!("Next {} Occurrences", command.upcoming).blue().bold());
    let horizon = app.today + Duration::days(app.config.scheduling.next_occurrence_lookahead_days as i64);
    let upcoming: Vec<_> = pattern
        .occurrences(app.today, horizon, false)
        .into_iter()
        .filter(|o| o.date >= app.today)
        .take(command.upcoming)
        .collect();
    if upcoming.is_empty() {
        println!("No upcoming occurrences");
    } else {
        display_occurrences(&upcoming);
    }

    Ok(())
}

pub async fn update_series(app: &App, command: UpdateCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let scope = match command.scope {
        ScopeArg::All => UpdateScope::All,
        ScopeArg::Future => {
            let from = command
                .from
                .as_deref()
                .ok_or_else(|| anyhow!("--from is required with --scope future"))?;
            UpdateScope::AllFuture {
                from: parse_date(from, app.today)?,
            }
        }
    };

    let changes = SeriesUpdate {
        provider_id: command.provider,
        service_id: command.service,
        service_name: command.service_name,
        duration_minutes: command.duration,
        room_id: nullable(command.room, command.room_clear),
        notes: nullable(command.notes, command.notes_clear),
        start_time: command.at.as_deref().map(parse_time).transpose()?,
        end_date: nullable(
            command.until.as_deref().map(|d| parse_date(d, app.today)).transpose()?,
            command.until_clear,
        ),
        occurrence_count: nullable(command.count, command.count_clear),
    };
    if changes.is_empty() {
        println!("No changes specified.");
        return Ok(());
    }

    let outcome = app.service.update_series(id, changes, scope).await?;
    match &outcome.successor {
        Some(successor) => {
            println!(
                "{} Series {} now ends {}",
                "✓".green().bold(),
                short_id(&outcome.pattern.id).yellow(),
                describe_end(outcome.pattern.rule.end)
            );
            println!(
                "{} Continued as series {} from {}",
                "✓".green().bold(),
                successor.id.to_string().yellow(),
                successor.start_date().to_string().cyan()
            );
        }
        None => println!(
            "{} Updated series {}",
            "✓".green().bold(),
            short_id(&outcome.pattern.id).yellow()
        ),
    }

    if !outcome.conflicts.is_empty() {
        println!("\n{} {} conflict(s) in the new schedule:", "⚠".yellow(), outcome.conflicts.len());
        display_conflicts(&outcome.conflicts);
    }
    Ok(())
}

pub async fn end_series(app: &App, command: EndCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let end_date = parse_date(&command.on, app.today)?;
    let pattern = app.service.end_series(id, end_date).await?;

    println!(
        "{} Series {} ends on {} ({})",
        "✓".green().bold(),
        short_id(&pattern.id).yellow(),
        end_date.to_string().cyan(),
        pattern.status
    );
    Ok(())
}

pub async fn cancel_series(app: &App, command: CancelCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let pattern = app.service.get_series(id).await?;

    if !command.force {
        let confirmation = Confirm::new()
            .with_prompt(format!(
                "Are you sure you want to cancel the {} series for {}?",
                pattern.service_name, pattern.patient_id
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirmation {
            println!("Cancellation aborted.");
            return Ok(());
        }
    }

    let pattern = app.service.cancel_series(id, command.reason).await?;
    println!("{} Cancelled series {}", "✓".green().bold(), short_id(&pattern.id).yellow());
    Ok(())
}

pub async fn pause_series(app: &App, command: IdCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let pattern = app.service.pause_series(id).await?;
    println!("{} Paused series {}", "⏸".yellow(), short_id(&pattern.id).yellow());
    Ok(())
}

pub async fn resume_series(app: &App, command: IdCommand) -> Result<()> {
    let id = resolve_series_id(&app.service, &command.id).await?;
    let pattern = app.service.resume_series(id).await?;
    println!("{} Resumed series {}", "▶".green(), short_id(&pattern.id).yellow());
    if let Some(next) = pattern.next_occurrence {
        println!("  Next occurrence: {}", next.to_string().cyan());
    }
    Ok(())
}
