use chrono::NaiveDate;
use clap::Parser;
use owo_colors::{OwoColorize, Style};
use recur_core::db;
use recur_core::error::CoreError;
use recur_core::repository::SqliteRepository;
use recur_core::service::SeriesService;
use recur_core::timezone::{Clock, SystemClock};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod parser;
mod util;
mod views;

/// Everything a command needs: the service, direct directory access and the
/// clinic's notion of today.
pub struct App {
    pub service: SeriesService,
    pub directory: Arc<SqliteRepository>,
    pub config: config::Config,
    pub today: NaiveDate,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = cli::Cli::parse();

    let config = match config::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} Invalid configuration: {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    tracing::debug!(
        database = %config.database_path,
        timezone = %config.clinic_timezone,
        "Loaded configuration"
    );
    let clock = match SystemClock::in_zone(&config.clinic_timezone) {
        Ok(clock) => clock,
        Err(e) => {
            handle_error(e.into());
            std::process::exit(1);
        }
    };
    let db_pool = match db::establish_connection(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let repository = Arc::new(SqliteRepository::new(db_pool));
    let service = SeriesService::new(
        repository.clone(),
        repository.clone(),
        repository.clone(),
        config.scheduling.clone(),
    )
    .with_clock(Arc::new(clock));
    let app = App {
        service,
        directory: repository,
        today: clock.today(),
        config,
    };

    let result = match cli.command {
        cli::Commands::Create(command) => commands::series::create_series(&app, command).await,
        cli::Commands::List(command) => commands::series::list_series(&app, command).await,
        cli::Commands::Show(command) => commands::series::show_series(&app, command).await,
        cli::Commands::Occurrences(command) => {
            commands::occurrences::list_occurrences(&app, command).await
        }
        cli::Commands::Skip(command) => commands::occurrences::skip_occurrence(&app, command).await,
        cli::Commands::Reschedule(command) => {
            commands::occurrences::reschedule_occurrence(&app, command).await
        }
        cli::Commands::Modify(command) => {
            commands::occurrences::modify_occurrence(&app, command).await
        }
        cli::Commands::Unskip(command) => {
            commands::occurrences::remove_exception(&app, command).await
        }
        cli::Commands::Update(command) => commands::series::update_series(&app, command).await,
        cli::Commands::End(command) => commands::series::end_series(&app, command).await,
        cli::Commands::Cancel(command) => commands::series::cancel_series(&app, command).await,
        cli::Commands::Pause(command) => commands::series::pause_series(&app, command).await,
        cli::Commands::Resume(command) => commands::series::resume_series(&app, command).await,
        cli::Commands::Conflicts(command) => {
            commands::occurrences::check_conflicts(&app, command).await
        }
        cli::Commands::Hours(command) => commands::directory::hours_command(&app, command).await,
        cli::Commands::Booking(command) => {
            commands::directory::booking_command(&app, command).await
        }
    };

    if let Err(e) = result {
        handle_error(e);
        std::process::exit(1);
    }
}

/// Logs go to stderr, filtered by `RECUR_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("RECUR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn handle_error(err: anyhow::Error) {
    let error_style = Style::new().red().bold();

    if let Some(core_error) = err.downcast_ref::<CoreError>() {
        match core_error {
            CoreError::NotFound(s) => {
                eprintln!("{} Not found: {}", "Error:".style(error_style), s);
            }
            CoreError::AmbiguousId(ids) => {
                eprintln!("{}", "Error: Ambiguous ID.".style(error_style));
                eprintln!("Did you mean one of these?");
                for id in ids {
                    eprintln!("  {}", id.yellow());
                }
            }
            CoreError::InvalidSpec(s) => {
                eprintln!("{} Invalid input: {}", "Error:".style(error_style), s);
            }
            CoreError::InvalidOccurrence(date) => {
                eprintln!(
                    "{} The series has no occurrence on {}",
                    "Error:".style(error_style),
                    date.yellow()
                );
            }
            CoreError::IllegalState(s) => {
                eprintln!("{} {}", "Error:".style(error_style), s);
            }
            CoreError::ConcurrentModification(id) => {
                eprintln!(
                    "{} Series {} was changed by someone else; please retry",
                    "Error:".style(error_style),
                    id.yellow()
                );
            }
            _ => eprintln!("{} {}", "Error:".style(error_style), err),
        }
    } else {
        eprintln!("{} {:#}", "Error:".style(error_style), err);
    }
}
