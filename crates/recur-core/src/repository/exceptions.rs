use crate::error::CoreError;
use crate::exceptions::ExceptionSet;
use crate::models::{ExceptionAction, ExceptionKind, ModifiedFields, SeriesException};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, Sqlite, SqliteConnection};
use uuid::fmt::Hyphenated;
use uuid::Uuid;

/// One row of `series_exceptions`; the action is spread over nullable columns.
#[derive(Debug, FromRow)]
struct ExceptionRow {
    original_date: NaiveDate,
    kind: ExceptionKind,
    new_date: Option<NaiveDate>,
    new_time: Option<NaiveTime>,
    new_provider_id: Option<String>,
    modified_fields: Option<String>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExceptionRow> for SeriesException {
    type Error = CoreError;

    fn try_from(row: ExceptionRow) -> Result<Self, Self::Error> {
        let action = match row.kind {
            ExceptionKind::Skip => ExceptionAction::Skip,
            ExceptionKind::Reschedule => ExceptionAction::Reschedule {
                new_date: row.new_date.ok_or_else(|| {
                    CoreError::IllegalState(format!(
                        "reschedule exception on {} has no target date",
                        row.original_date
                    ))
                })?,
                new_time: row.new_time,
                new_provider_id: row.new_provider_id,
            },
            ExceptionKind::Modify => {
                let fields: ModifiedFields = match row.modified_fields.as_deref() {
                    Some(json) => serde_json::from_str(json)?,
                    None => ModifiedFields::default(),
                };
                ExceptionAction::Modify(fields)
            }
        };

        Ok(SeriesException {
            original_date: row.original_date,
            action,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

pub(crate) async fn load_exceptions(
    conn: &mut SqliteConnection,
    series_id: Uuid,
) -> Result<ExceptionSet, CoreError> {
    let rows: Vec<ExceptionRow> = sqlx::query_as::<Sqlite, ExceptionRow>(
        r#"SELECT original_date, kind, new_date, new_time, new_provider_id, modified_fields, reason, created_at
        FROM series_exceptions WHERE series_id = $1 ORDER BY original_date"#,
    )
    .bind(series_id.hyphenated())
    .fetch_all(&mut *conn)
    .await?;

    let exceptions = rows
        .into_iter()
        .map(SeriesException::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ExceptionSet::from(exceptions))
}

/// Replaces the stored exception list of a series with `exceptions`.
pub(crate) async fn replace_exceptions(
    conn: &mut SqliteConnection,
    series_id: Uuid,
    exceptions: &ExceptionSet,
) -> Result<(), CoreError> {
    let id: Hyphenated = series_id.hyphenated();

    sqlx::query("DELETE FROM series_exceptions WHERE series_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    for exception in exceptions.iter() {
        let (new_date, new_time, new_provider_id, modified_fields) = match &exception.action {
            ExceptionAction::Skip => (None, None, None, None),
            ExceptionAction::Reschedule {
                new_date,
                new_time,
                new_provider_id,
            } => (Some(*new_date), *new_time, new_provider_id.clone(), None),
            ExceptionAction::Modify(fields) => (None, None, None, Some(serde_json::to_string(fields)?)),
        };

        sqlx::query(
            r#"INSERT INTO series_exceptions (series_id, original_date, kind, new_date, new_time, new_provider_id, modified_fields, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(id)
        .bind(exception.original_date)
        .bind(exception.kind())
        .bind(new_date)
        .bind(new_time)
        .bind(new_provider_id)
        .bind(modified_fields)
        .bind(&exception.reason)
        .bind(exception.created_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
