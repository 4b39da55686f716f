//! # Domain Models
//!
//! Canonical types for the IBOV theoretical portfolio.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ConstituentRow`] | One security of the daily portfolio snapshot |
//! | [`PartitionDate`] | `year=/month=/day=` partition key |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Rows are validated at construction: the ticker code and share class must
//! be non-empty, the theoretical quantity finite and non-negative, and the
//! weight finite.

mod partition;
mod row;
mod timestamp;

pub use partition::{
    normalize_prefix, raw_file_name, raw_object_key, refined_date_prefix, refined_object_key,
    sanitize_class, PartitionDate, REFINED_PART_FILE,
};
pub use row::ConstituentRow;
pub use timestamp::UtcDateTime;
