use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Serialization error")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid recurrence spec: {0}")]
    InvalidSpec(String),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRRule(String),

    #[error("No occurrence exists on {0}")]
    InvalidOccurrence(NaiveDate),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Ambiguous short ID. Did you mean one of these?")]
    AmbiguousId(Vec<String>),

    #[error("Series {0} was modified concurrently; reload and retry")]
    ConcurrentModification(Uuid),
}
