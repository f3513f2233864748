use async_trait::async_trait;
use chrono::Weekday;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::models::{Booking, BookingQuery, BookingStatus, TimeRange, WorkingHours};

/// Read access to existing appointments.
#[async_trait]
pub trait AppointmentDirectory: Send + Sync {
    /// Bookings matching `query` that overlap `range`, in any status.
    async fn query(&self, query: &BookingQuery, range: TimeRange) -> Result<Vec<Booking>, CoreError>;
}

/// Read access to provider schedules.
#[async_trait]
pub trait WorkingHoursDirectory: Send + Sync {
    /// The provider's working interval on `weekday`, or `None` when they do
    /// not work that day.
    async fn query(&self, provider_id: &str, weekday: Weekday) -> Result<Option<WorkingHours>, CoreError>;
}

/// In-memory appointment and working-hours directory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    bookings: RwLock<Vec<Booking>>,
    hours: RwLock<HashMap<(String, Weekday), WorkingHours>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_booking(&self, booking: Booking) {
        self.bookings.write().await.push(booking);
    }

    pub async fn cancel_booking(&self, id: &str) -> Result<(), CoreError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", id)))?;
        booking.status = BookingStatus::Cancelled;
        Ok(())
    }

    /// Sets or clears a provider's hours for one weekday.
    pub async fn set_working_hours(&self, provider_id: &str, weekday: Weekday, hours: Option<WorkingHours>) {
        let key = (provider_id.to_string(), weekday);
        let mut table = self.hours.write().await;
        match hours {
            Some(hours) => {
                table.insert(key, hours);
            }
            None => {
                table.remove(&key);
            }
        }
    }

    /// Gives a provider the same hours on every listed weekday.
    pub async fn set_weekly_hours(&self, provider_id: &str, days: &[Weekday], hours: WorkingHours) {
        for day in days {
            self.set_working_hours(provider_id, *day, Some(hours)).await;
        }
    }
}

#[async_trait]
impl AppointmentDirectory for MemoryDirectory {
    async fn query(&self, query: &BookingQuery, range: TimeRange) -> Result<Vec<Booking>, CoreError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .iter()
            .filter(|b| match query {
                BookingQuery::Provider(id) => b.provider_id == *id,
                BookingQuery::Patient(id) => b.patient_id == *id,
                BookingQuery::Room(id) => b.room_id.as_deref() == Some(id.as_str()),
            })
            .filter(|b| range.overlaps(b.start, b.end))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WorkingHoursDirectory for MemoryDirectory {
    async fn query(&self, provider_id: &str, weekday: Weekday) -> Result<Option<WorkingHours>, CoreError> {
        let table = self.hours.read().await;
        Ok(table.get(&(provider_id.to_string(), weekday)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn at(d: u32, h: u32, m: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_query_is_half_open() {
        let directory = MemoryDirectory::new();
        directory.add_booking(Booking::new("b1", "prov-1", "pat-9", at(3, 9, 0), 60)).await;

        let adjacent = TimeRange::new(at(3, 10, 0), at(3, 11, 0));
        let found = AppointmentDirectory::query(&directory, &BookingQuery::Provider("prov-1".into()), adjacent)
            .await
            .unwrap();
        assert!(found.is_empty());

        let overlapping = TimeRange::new(at(3, 9, 59), at(3, 11, 0));
        let found = AppointmentDirectory::query(&directory, &BookingQuery::Provider("prov-1".into()), overlapping)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_room_query_and_cancel() {
        let directory = MemoryDirectory::new();
        directory
            .add_booking(Booking::new("b1", "prov-2", "pat-9", at(3, 9, 0), 60).with_room("room-1"))
            .await;
        directory.cancel_booking("b1").await.unwrap();

        let range = TimeRange::new(at(3, 9, 0), at(3, 10, 0));
        let found = AppointmentDirectory::query(&directory, &BookingQuery::Room("room-1".into()), range)
            .await
            .unwrap();
        assert_eq!(found[0].status, BookingStatus::Cancelled);
        assert!(directory.cancel_booking("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_working_hours_set_and_clear() {
        let directory = MemoryDirectory::new();
        let hours = WorkingHours::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        );
        directory.set_weekly_hours("prov-1", &[Weekday::Mon, Weekday::Tue], hours).await;
        assert_eq!(
            WorkingHoursDirectory::query(&directory, "prov-1", Weekday::Tue).await.unwrap(),
            Some(hours)
        );

        directory.set_working_hours("prov-1", Weekday::Tue, None).await;
        assert_eq!(WorkingHoursDirectory::query(&directory, "prov-1", Weekday::Tue).await.unwrap(), None);
    }
}
