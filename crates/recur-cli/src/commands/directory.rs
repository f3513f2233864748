use anyhow::Result;
use owo_colors::OwoColorize;
use recur_core::models::{Booking, WorkingHours};

use crate::cli::{BookingCommand, BookingSubcommand, HoursCommand, HoursSubcommand};
use crate::parser::{parse_datetime, parse_time, parse_weekdays};
use crate::views::table::display_hours;
use crate::App;

pub async fn hours_command(app: &App, command: HoursCommand) -> Result<()> {
    match command.command {
        HoursSubcommand::Set(cmd) => {
            let days = parse_weekdays(&cmd.days)?;
            let hours = match (cmd.off, cmd.start, cmd.end) {
                (true, _, _) => None,
                (false, Some(start), Some(end)) => Some(WorkingHours::new(parse_time(&start)?, parse_time(&end)?)),
                _ => return Err(anyhow::anyhow!("--start and --end are required unless --off is given")),
            };

            for day in &days {
                app.directory.set_working_hours(&cmd.provider, *day, hours).await?;
            }

            let days: Vec<String> = days.iter().map(|d| d.to_string()).collect();
            match hours {
                Some(hours) => println!(
                    "{} {} works {}-{} on {}",
                    "✓".green().bold(),
                    cmd.provider.cyan(),
                    hours.start.format("%H:%M"),
                    hours.end.format("%H:%M"),
                    days.join(", ")
                ),
                None => println!("{} {} is off on {}", "✓".green().bold(), cmd.provider.cyan(), days.join(", ")),
            }
            Ok(())
        }
        HoursSubcommand::List(cmd) => {
            let hours = app.directory.list_working_hours(&cmd.provider).await?;
            display_hours(&cmd.provider, &hours);
            Ok(())
        }
    }
}

pub async fn booking_command(app: &App, command: BookingCommand) -> Result<()> {
    match command.command {
        BookingSubcommand::Add(cmd) => {
            let mut booking = Booking::new(
                cmd.id,
                cmd.provider,
                cmd.patient,
                parse_datetime(&cmd.start)?,
                cmd.duration,
            );
            booking.room_id = cmd.room;
            app.directory.add_booking(&booking).await?;

            println!(
                "{} Recorded booking {} on {}",
                "✓".green().bold(),
                booking.id.yellow(),
                booking.start.format("%Y-%m-%d %H:%M")
            );
            Ok(())
        }
        BookingSubcommand::Cancel(cmd) => {
            app.directory.cancel_booking(&cmd.id).await?;
            println!("{} Cancelled booking {}", "✓".green().bold(), cmd.id.yellow());
            Ok(())
        }
    }
}
