use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{RecurrencePattern, SeriesFilter, SeriesPage};
use async_trait::async_trait;
use uuid::Uuid;

// Domain modules
pub mod bookings;
pub mod exceptions;
pub mod memory;
pub mod series;

pub use memory::MemoryRepository;

/// Storage for recurring series and their exception overlays.
///
/// Implementations enforce optimistic concurrency on `revision`: a pattern
/// with revision 0 is inserted, any other revision must match the stored one
/// or the save fails with `ConcurrentModification`. A successful save returns
/// the pattern with its revision bumped. The pattern and its exception list
/// are always written together.
#[async_trait]
pub trait SeriesRepository: Send + Sync {
    async fn load(&self, id: Uuid) -> Result<Option<RecurrencePattern>, CoreError>;
    async fn save(&self, pattern: RecurrencePattern) -> Result<RecurrencePattern, CoreError>;
    /// Saves several patterns atomically: either all are written or none.
    async fn save_all(&self, patterns: Vec<RecurrencePattern>) -> Result<Vec<RecurrencePattern>, CoreError>;
    async fn list(&self, filter: &SeriesFilter) -> Result<SeriesPage, CoreError>;
    async fn find_by_id_prefix(&self, prefix: &str) -> Result<Vec<RecurrencePattern>, CoreError>;
}

/// SQLite implementation of the series repository and of both directories
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool for internal use across modules
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}
