use crate::error::CoreError;
use crate::exceptions::ExceptionSet;
use crate::models::{Frequency, RecurrencePattern, SeriesFilter, SeriesPage, SeriesStatus};
use crate::recurrence::rrule;
use crate::repository::exceptions::{load_exceptions, replace_exceptions};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;
use uuid::fmt::Hyphenated;
use uuid::Uuid;

const SERIES_COLUMNS: &str = "id, patient_id, provider_id, service_id, service_name, room_id, notes, \
    duration_minutes, frequency, rrule, status, next_occurrence, parent_series_id, revision, created_at, updated_at";

#[derive(Debug, FromRow)]
struct SeriesRow {
    id: Hyphenated,
    patient_id: String,
    provider_id: String,
    service_id: String,
    service_name: String,
    room_id: Option<String>,
    notes: Option<String>,
    duration_minutes: i64,
    frequency: Frequency,
    rrule: String,
    status: SeriesStatus,
    next_occurrence: Option<NaiveDate>,
    parent_series_id: Option<Hyphenated>,
    revision: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SeriesRow {
    /// Rebuilds the pattern; the rule is parsed back from its encoding.
    fn into_pattern(self, exceptions: ExceptionSet) -> Result<RecurrencePattern, CoreError> {
        let rule = rrule::parse(&self.rrule)?;
        Ok(RecurrencePattern {
            id: self.id.into_uuid(),
            patient_id: self.patient_id,
            provider_id: self.provider_id,
            service_id: self.service_id,
            service_name: self.service_name,
            room_id: self.room_id,
            notes: self.notes,
            duration_minutes: u32::try_from(self.duration_minutes).unwrap_or_default(),
            frequency: self.frequency,
            rule,
            rrule: self.rrule,
            status: self.status,
            exceptions,
            next_occurrence: self.next_occurrence,
            parent_series_id: self.parent_series_id.map(Hyphenated::into_uuid),
            revision: u32::try_from(self.revision).unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

async fn hydrate(conn: &mut SqliteConnection, rows: Vec<SeriesRow>) -> Result<Vec<RecurrencePattern>, CoreError> {
    let mut patterns = Vec::with_capacity(rows.len());
    for row in rows {
        let exceptions = load_exceptions(conn, row.id.into_uuid()).await?;
        patterns.push(row.into_pattern(exceptions)?);
    }
    Ok(patterns)
}

/// Writes one pattern inside an open transaction and returns it with its
/// revision bumped.
async fn write_pattern(
    conn: &mut SqliteConnection,
    mut pattern: RecurrencePattern,
) -> Result<RecurrencePattern, CoreError> {
    let expected = pattern.revision;
    pattern.revision = expected + 1;

    if expected == 0 {
        sqlx::query(
            r#"INSERT INTO recurring_series (id, patient_id, provider_id, service_id, service_name, room_id, notes,
                duration_minutes, frequency, rrule, status, next_occurrence, parent_series_id, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"#,
        )
        .bind(pattern.id.hyphenated())
        .bind(&pattern.patient_id)
        .bind(&pattern.provider_id)
        .bind(&pattern.service_id)
        .bind(&pattern.service_name)
        .bind(&pattern.room_id)
        .bind(&pattern.notes)
        .bind(pattern.duration_minutes as i64)
        .bind(pattern.frequency)
        .bind(&pattern.rrule)
        .bind(pattern.status)
        .bind(pattern.next_occurrence)
        .bind(pattern.parent_series_id.map(|id| id.hyphenated()))
        .bind(pattern.revision as i64)
        .bind(pattern.created_at)
        .bind(pattern.updated_at)
        .execute(&mut *conn)
        .await?;
    } else {
        let result = sqlx::query(
            r#"UPDATE recurring_series SET provider_id = $1, service_id = $2, service_name = $3, room_id = $4,
                notes = $5, duration_minutes = $6, frequency = $7, rrule = $8, status = $9, next_occurrence = $10,
                parent_series_id = $11, revision = $12, updated_at = $13
            WHERE id = $14 AND revision = $15"#,
        )
        .bind(&pattern.provider_id)
        .bind(&pattern.service_id)
        .bind(&pattern.service_name)
        .bind(&pattern.room_id)
        .bind(&pattern.notes)
        .bind(pattern.duration_minutes as i64)
        .bind(pattern.frequency)
        .bind(&pattern.rrule)
        .bind(pattern.status)
        .bind(pattern.next_occurrence)
        .bind(pattern.parent_series_id.map(|id| id.hyphenated()))
        .bind(pattern.revision as i64)
        .bind(pattern.updated_at)
        .bind(pattern.id.hyphenated())
        .bind(expected as i64)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT revision FROM recurring_series WHERE id = $1")
                .bind(pattern.id.hyphenated())
                .fetch_optional(&mut *conn)
                .await?;
            return Err(match exists {
                Some(_) => CoreError::ConcurrentModification(pattern.id),
                None => CoreError::NotFound(format!("series {}", pattern.id)),
            });
        }
    }

    replace_exceptions(conn, pattern.id, &pattern.exceptions).await?;
    debug!(series_id = %pattern.id, revision = pattern.revision, "Saved series");
    Ok(pattern)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &SeriesFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(patient_id) = &filter.patient_id {
        qb.push(" AND patient_id = ").push_bind(patient_id.clone());
    }
    if let Some(provider_id) = &filter.provider_id {
        qb.push(" AND provider_id = ").push_bind(provider_id.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
}

#[async_trait]
impl super::SeriesRepository for SqliteRepository {
    async fn load(&self, id: Uuid) -> Result<Option<RecurrencePattern>, CoreError> {
        let mut conn = self.pool().acquire().await?;
        let row: Option<SeriesRow> = sqlx::query_as(&format!(
            "SELECT {} FROM recurring_series WHERE id = $1",
            SERIES_COLUMNS
        ))
        .bind(id.hyphenated())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let exceptions = load_exceptions(&mut *conn, id).await?;
                Ok(Some(row.into_pattern(exceptions)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, pattern: RecurrencePattern) -> Result<RecurrencePattern, CoreError> {
        let mut tx = self.pool().begin().await?;
        let saved = write_pattern(&mut *tx, pattern).await?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn save_all(&self, patterns: Vec<RecurrencePattern>) -> Result<Vec<RecurrencePattern>, CoreError> {
        let mut tx = self.pool().begin().await?;
        let mut saved = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            saved.push(write_pattern(&mut *tx, pattern).await?);
        }
        tx.commit().await?;
        Ok(saved)
    }

    async fn list(&self, filter: &SeriesFilter) -> Result<SeriesPage, CoreError> {
        let mut conn = self.pool().acquire().await?;

        let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM recurring_series");
        push_filters(&mut count_qb, filter);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(&mut *conn).await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {} FROM recurring_series", SERIES_COLUMNS));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset() as i64);
        let rows: Vec<SeriesRow> = qb.build_query_as().fetch_all(&mut *conn).await?;

        Ok(SeriesPage {
            items: hydrate(&mut *conn, rows).await?,
            total: total as u64,
            page: filter.page,
            limit: filter.limit,
        })
    }

    async fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<RecurrencePattern>, CoreError> {
        let mut pattern = String::with_capacity(prefix.len() * 2 + 1);
        for c in prefix.to_lowercase().chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');

        let mut conn = self.pool().acquire().await?;
        let rows: Vec<SeriesRow> = sqlx::query_as(&format!(
            "SELECT {} FROM recurring_series WHERE id LIKE $1 ESCAPE '\\' ORDER BY created_at",
            SERIES_COLUMNS
        ))
        .bind(pattern)
        .fetch_all(&mut *conn)
        .await?;

        hydrate(&mut *conn, rows).await
    }
}
