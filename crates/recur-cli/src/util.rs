use anyhow::Result;
use recur_core::service::SeriesService;
use uuid::Uuid;

/// Resolves a full series ID or a unique prefix of at least two characters.
pub async fn resolve_series_id(service: &SeriesService, short_id: &str) -> Result<Uuid> {
    Ok(service.resolve_id(short_id.trim()).await?)
}

/// First eight characters of an ID, enough to address a series.
pub fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Splits an optional value and its `--*-clear` flag into an update field.
pub fn nullable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable() {
        assert_eq!(nullable(Some(3), false), Some(Some(3)));
        assert_eq!(nullable::<u32>(None, true), Some(None));
        assert_eq!(nullable::<u32>(None, false), None);
    }
}
