use crate::error::CoreError;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Validate IANA timezone name
pub fn validate_timezone(timezone: &str) -> Result<(), CoreError> {
    parse_timezone(timezone).map(|_| ())
}

pub fn parse_timezone(timezone: &str) -> Result<Tz, CoreError> {
    Tz::from_str(timezone).map_err(|_| CoreError::InvalidTimezone(timezone.to_string()))
}

/// Source of "now" for the series service.
///
/// Occurrence times are civil and never converted; the clock only decides
/// which calendar day is "today" at the clinic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate;
}

/// Wall clock, optionally evaluated in a clinic timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    zone: Option<Tz>,
}

impl SystemClock {
    pub fn utc() -> Self {
        Self { zone: None }
    }

    pub fn in_zone(timezone: &str) -> Result<Self, CoreError> {
        Ok(Self {
            zone: Some(parse_timezone(timezone)?),
        })
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        let now = Utc::now();
        match self.zone {
            Some(tz) => now.with_timezone(&tz).date_naive(),
            None => now.date_naive(),
        }
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
    zone: Option<Tz>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now, zone: None }
    }

    /// Clock whose "today" is `date`, observed at noon UTC.
    pub fn on(date: NaiveDate) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default();
        Self::new(DateTime::from_naive_utc_and_offset(noon, Utc))
    }

    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = Some(zone);
        self
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn today(&self) -> NaiveDate {
        match self.zone {
            Some(tz) => self.now.with_timezone(&tz).date_naive(),
            None => self.now.date_naive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_timezone() {
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("America/New_York").is_ok());
        assert!(matches!(
            validate_timezone("Invalid/Timezone"),
            Err(CoreError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_today_follows_clinic_zone() {
        // 02:30 UTC is still the previous evening in Los Angeles.
        let instant = Utc.with_ymd_and_hms(2024, 6, 4, 2, 30, 0).unwrap();
        let clock = FixedClock::new(instant);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 6, 4).unwrap());

        let la = clock.with_zone(parse_timezone("America/Los_Angeles").unwrap());
        assert_eq!(la.today(), NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
    }

    #[test]
    fn test_fixed_clock_on_date() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert_eq!(FixedClock::on(date).today(), date);
        assert!(SystemClock::in_zone("Europe/Nowhere").is_err());
    }
}
