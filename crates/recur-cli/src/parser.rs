use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_english::{parse_date_string, Dialect};

const TIME_FORMATS: [&str; 5] = ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p", "%I:%M:%S %p"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Parses a calendar date: ISO `YYYY-MM-DD`, or natural language
/// ("tomorrow", "next monday") relative to `today`.
pub fn parse_date(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }

    let noon = today
        .and_hms_opt(12, 0, 0)
        .ok_or_else(|| anyhow!("Invalid reference date '{}'", today))?;
    parse_date_string(input, Utc.from_utc_datetime(&noon), Dialect::Us)
        .map(|dt| dt.date_naive())
        .map_err(|e| anyhow!("Failed to parse date '{}': {}", input, e))
}

/// Parses a time of day such as `14:30` or `2:30 PM`.
pub fn parse_time(input: &str) -> Result<NaiveTime> {
    let input = input.trim();
    let upper = input.to_uppercase();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&upper, format).ok())
        .ok_or_else(|| anyhow!("Failed to parse time '{}'. Use HH:MM or H:MM AM/PM", input))
}

/// Parses a civil date-time such as `2025-08-04 10:30`.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime> {
    let input = input.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .ok_or_else(|| anyhow!("Failed to parse date-time '{}'. Use YYYY-MM-DD HH:MM", input))
}

/// Parses a comma-separated weekday list such as `mon,wed,fri`.
pub fn parse_weekdays(input: &str) -> Result<Vec<Weekday>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|day| {
            day.parse::<Weekday>()
                .map_err(|_| anyhow!("Invalid day of week '{}'. Use mon,tue,wed,thu,fri,sat,sun", day))
        })
        .collect::<Result<Vec<_>>>()
        .and_then(|days| {
            if days.is_empty() {
                Err(anyhow!("At least one day of week is required"))
            } else {
                Ok(days)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date() {
        let today = date(2024, 6, 5);
        assert_eq!(parse_date("2024-07-01", today).unwrap(), date(2024, 7, 1));
        assert_eq!(parse_date("tomorrow", today).unwrap(), date(2024, 6, 6));
        assert!(parse_date("not a date", today).is_err());
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("14:30").unwrap(), NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert_eq!(parse_time("2:30 pm").unwrap(), NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert_eq!(parse_time("9:05AM").unwrap(), NaiveTime::from_hms_opt(9, 5, 0).unwrap());
        assert!(parse_time("25:00").is_err());
    }

    #[test]
    fn test_parse_datetime() {
        let expected = date(2024, 6, 10).and_hms_opt(10, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-06-10 10:30").unwrap(), expected);
        assert_eq!(parse_datetime("2024-06-10T10:30").unwrap(), expected);
        assert!(parse_datetime("2024-06-10").is_err());
    }

    #[test]
    fn test_parse_weekdays() {
        assert_eq!(
            parse_weekdays("mon, wed,Fri").unwrap(),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]
        );
        assert!(parse_weekdays("mon,funday").is_err());
        assert!(parse_weekdays(",").is_err());
    }
}
