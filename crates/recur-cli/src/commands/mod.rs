pub mod directory;
pub mod occurrences;
pub mod series;
