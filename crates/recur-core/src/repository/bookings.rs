use crate::directory::{AppointmentDirectory, WorkingHoursDirectory};
use crate::error::CoreError;
use crate::models::{Booking, BookingQuery, BookingStatus, TimeRange, WorkingHours};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime, Weekday};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use uuid::fmt::Hyphenated;

#[derive(Debug, FromRow)]
struct BookingRow {
    id: String,
    provider_id: String,
    patient_id: String,
    room_id: Option<String>,
    start_at: NaiveDateTime,
    end_at: NaiveDateTime,
    status: BookingStatus,
    series_id: Option<Hyphenated>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            provider_id: row.provider_id,
            patient_id: row.patient_id,
            room_id: row.room_id,
            start: row.start_at,
            end: row.end_at,
            status: row.status,
            series_id: row.series_id.map(Hyphenated::into_uuid),
        }
    }
}

#[derive(Debug, FromRow)]
struct HoursRow {
    weekday: i64,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

fn weekday_from_index(index: i64) -> Result<Weekday, CoreError> {
    u8::try_from(index)
        .ok()
        .and_then(|i| Weekday::try_from(i).ok())
        .ok_or_else(|| CoreError::IllegalState(format!("stored weekday {} out of range", index)))
}

/// Directory maintenance used by the CLI.
impl SqliteRepository {
    pub async fn add_booking(&self, booking: &Booking) -> Result<(), CoreError> {
        if booking.end <= booking.start {
            return Err(CoreError::InvalidSpec("booking must end after it starts".to_string()));
        }

        sqlx::query(
            r#"INSERT INTO bookings (id, provider_id, patient_id, room_id, start_at, end_at, status, series_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(&booking.id)
        .bind(&booking.provider_id)
        .bind(&booking.patient_id)
        .bind(&booking.room_id)
        .bind(booking.start)
        .bind(booking.end)
        .bind(booking.status)
        .bind(booking.series_id.map(|id| id.hyphenated()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn cancel_booking(&self, id: &str) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE bookings SET status = $1 WHERE id = $2")
            .bind(BookingStatus::Cancelled)
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("booking {}", id)));
        }
        Ok(())
    }

    /// Sets or clears a provider's hours for one weekday.
    pub async fn set_working_hours(
        &self,
        provider_id: &str,
        weekday: Weekday,
        hours: Option<WorkingHours>,
    ) -> Result<(), CoreError> {
        let index = weekday.num_days_from_monday() as i64;
        match hours {
            Some(hours) => {
                if hours.end <= hours.start {
                    return Err(CoreError::InvalidSpec(
                        "working hours must end after they start".to_string(),
                    ));
                }
                sqlx::query(
                    r#"INSERT INTO working_hours (provider_id, weekday, start_time, end_time) VALUES ($1, $2, $3, $4)
                    ON CONFLICT(provider_id, weekday) DO UPDATE SET start_time = excluded.start_time, end_time = excluded.end_time"#,
                )
                .bind(provider_id)
                .bind(index)
                .bind(hours.start)
                .bind(hours.end)
                .execute(self.pool())
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM working_hours WHERE provider_id = $1 AND weekday = $2")
                    .bind(provider_id)
                    .bind(index)
                    .execute(self.pool())
                    .await?;
            }
        }
        Ok(())
    }

    /// A provider's weekly schedule, Monday first.
    pub async fn list_working_hours(&self, provider_id: &str) -> Result<Vec<(Weekday, WorkingHours)>, CoreError> {
        let rows: Vec<HoursRow> = sqlx::query_as(
            "SELECT weekday, start_time, end_time FROM working_hours WHERE provider_id = $1 ORDER BY weekday",
        )
        .bind(provider_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| Ok((weekday_from_index(row.weekday)?, WorkingHours::new(row.start_time, row.end_time))))
            .collect()
    }
}

#[async_trait]
impl AppointmentDirectory for SqliteRepository {
    async fn query(&self, query: &BookingQuery, range: TimeRange) -> Result<Vec<Booking>, CoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, provider_id, patient_id, room_id, start_at, end_at, status, series_id FROM bookings WHERE ",
        );
        match query {
            BookingQuery::Provider(id) => qb.push("provider_id = ").push_bind(id.clone()),
            BookingQuery::Patient(id) => qb.push("patient_id = ").push_bind(id.clone()),
            BookingQuery::Room(id) => qb.push("room_id = ").push_bind(id.clone()),
        };
        qb.push(" AND start_at < ")
            .push_bind(range.end)
            .push(" AND end_at > ")
            .push_bind(range.start)
            .push(" ORDER BY start_at");

        let rows: Vec<BookingRow> = qb.build_query_as().fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }
}

#[async_trait]
impl WorkingHoursDirectory for SqliteRepository {
    async fn query(&self, provider_id: &str, weekday: Weekday) -> Result<Option<WorkingHours>, CoreError> {
        let row: Option<HoursRow> = sqlx::query_as(
            "SELECT weekday, start_time, end_time FROM working_hours WHERE provider_id = $1 AND weekday = $2",
        )
        .bind(provider_id)
        .bind(weekday.num_days_from_monday() as i64)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|r| WorkingHours::new(r.start_time, r.end_time)))
    }
}
