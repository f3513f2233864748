use crate::error::CoreError;
use crate::models::{RecurrencePattern, SeriesFilter, SeriesPage};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory series repository with the same revision checks as the SQLite
/// implementation.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    series: RwLock<HashMap<Uuid, RecurrencePattern>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_revision(
    stored: &HashMap<Uuid, RecurrencePattern>,
    pattern: &RecurrencePattern,
) -> Result<(), CoreError> {
    match (pattern.revision, stored.get(&pattern.id)) {
        (0, None) => Ok(()),
        (0, Some(_)) => Err(CoreError::ConcurrentModification(pattern.id)),
        (_, None) => Err(CoreError::NotFound(format!("series {}", pattern.id))),
        (revision, Some(current)) if current.revision == revision => Ok(()),
        (_, Some(_)) => Err(CoreError::ConcurrentModification(pattern.id)),
    }
}

#[async_trait]
impl super::SeriesRepository for MemoryRepository {
    async fn load(&self, id: Uuid) -> Result<Option<RecurrencePattern>, CoreError> {
        Ok(self.series.read().await.get(&id).cloned())
    }

    async fn save(&self, pattern: RecurrencePattern) -> Result<RecurrencePattern, CoreError> {
        let mut saved = self.save_all(vec![pattern]).await?;
        saved
            .pop()
            .ok_or_else(|| CoreError::IllegalState("save produced no pattern".to_string()))
    }

    async fn save_all(&self, patterns: Vec<RecurrencePattern>) -> Result<Vec<RecurrencePattern>, CoreError> {
        let mut series = self.series.write().await;
        for pattern in &patterns {
            check_revision(&series, pattern)?;
        }

        let mut saved = Vec::with_capacity(patterns.len());
        for mut pattern in patterns {
            pattern.revision += 1;
            series.insert(pattern.id, pattern.clone());
            saved.push(pattern);
        }
        Ok(saved)
    }

    async fn list(&self, filter: &SeriesFilter) -> Result<SeriesPage, CoreError> {
        let series = self.series.read().await;
        let mut matching: Vec<&RecurrencePattern> = series.values().filter(|p| filter.matches(p)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        Ok(SeriesPage {
            total: matching.len() as u64,
            items: matching
                .into_iter()
                .skip(filter.offset() as usize)
                .take(filter.limit as usize)
                .cloned()
                .collect(),
            page: filter.page,
            limit: filter.limit,
        })
    }

    async fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<RecurrencePattern>, CoreError> {
        let prefix = prefix.to_lowercase();
        let series = self.series.read().await;
        let mut found: Vec<RecurrencePattern> = series
            .values()
            .filter(|p| p.id.to_string().starts_with(&prefix))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }
}
