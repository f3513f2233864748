//! Recurrence rules: compilation, canonical encoding and expansion.
//!
//! Everything in this module is pure. Times are civil wall-clock values, so an
//! appointment at 10:00 stays at 10:00 across daylight-saving transitions.

pub mod expand;
pub mod rrule;
pub mod rule;

pub use expand::{count_before, expand, first_on_or_after, is_occurrence, next_occurrence, overlay, BaseDates};
pub use rule::{CompiledRule, Freq, RecurrenceRule, RuleCompiler};
