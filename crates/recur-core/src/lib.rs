//! # Recur Core Library
//!
//! A recurring-appointment engine for clinics: a series is stored once as a
//! compact rule plus a sparse set of per-date exceptions, and its concrete
//! appointments are expanded on demand.
//!
//! ## Features
//!
//! - **Rule Compilation**: Caller-facing recurrence specs are validated and
//!   normalized into a canonical RRULE-style encoding
//! - **Exception Overlay**: Skip, reschedule or modify single occurrences
//!   without touching the base rule
//! - **Civil-Time Expansion**: Occurrences keep their wall-clock time across
//!   daylight-saving transitions
//! - **Conflict Detection**: Advisory checks against working hours and
//!   existing provider, patient and room bookings
//! - **Optimistic Concurrency**: Revision-checked saves and per-series locks
//!
//! ## Core Modules
//!
//! - [`recurrence`]: Rule compilation, encoding and occurrence expansion
//! - [`exceptions`]: Exception overlay and its validation
//! - [`conflicts`]: Conflict detection against external directories
//! - [`lifecycle`]: Series status state machine
//! - [`service`]: The series service tying everything together
//! - [`repository`]: Series persistence (SQLite and in-memory)
//! - [`directory`]: Appointment and working-hours lookups
//! - [`db`]: Database connection and migration management
//! - [`models`]: Core data structures and transfer objects
//! - [`audit`]: Series event sink
//! - [`timezone`]: Timezone validation and clocks
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use chrono::{NaiveDate, NaiveTime};
//! use recur_core::{
//!     db,
//!     models::{ConflictCheck, Frequency, NewSeriesData, RecurrenceSpec, SchedulingConfig},
//!     repository::SqliteRepository,
//!     service::SeriesService,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("recur.db").await?;
//!     let repo = Arc::new(SqliteRepository::new(pool));
//!     let service = SeriesService::new(repo.clone(), repo.clone(), repo, SchedulingConfig::default());
//!
//!     let mut recurrence = RecurrenceSpec::new(
//!         Frequency::Weekly,
//!         NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
//!         NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
//!     );
//!     recurrence.occurrence_count = Some(6);
//!
//!     let created = service
//!         .create_series(
//!             NewSeriesData {
//!                 patient_id: "pat-1".to_string(),
//!                 provider_id: "prov-1".to_string(),
//!                 service_id: "svc-facial".to_string(),
//!                 service_name: "HydraFacial".to_string(),
//!                 duration_minutes: 60,
//!                 room_id: None,
//!                 notes: None,
//!                 recurrence,
//!             },
//!             ConflictCheck::default(),
//!         )
//!         .await?;
//!     println!("Created series {} ({})", created.pattern.id, created.pattern.rrule);
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod conflicts;
pub mod db;
pub mod directory;
pub mod error;
pub mod exceptions;
pub mod lifecycle;
pub mod models;
pub mod recurrence;
pub mod repository;
pub mod service;
pub mod timezone;
