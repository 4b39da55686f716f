//! Hive-style partition keys shared by the raw and refined layouts.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::domain::row::format_iso_date;
use crate::ValidationError;

/// File name of the single refined file written per group.
pub const REFINED_PART_FILE: &str = "part-00000.parquet";

/// `year=/month=/day=` partition of one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

impl PartitionDate {
    pub fn from_date(date: Date) -> Self {
        Self {
            year: date.year(),
            month: u8::from(date.month()),
            day: date.day(),
        }
    }

    pub fn to_date(self) -> Result<Date, ValidationError> {
        let invalid = || ValidationError::InvalidDate {
            value: format!("{:04}-{:02}-{:02}", self.year, self.month, self.day),
        };
        let month = Month::try_from(self.month).map_err(|_| invalid())?;
        Date::from_calendar_date(self.year, month, self.day).map_err(|_| invalid())
    }

    /// Extracts `year=`, `month=` and `day=` segments from a storage key.
    ///
    /// Returns `None` unless all three are present and form a real date.
    pub fn from_key(key: &str) -> Option<Self> {
        let mut year = None;
        let mut month = None;
        let mut day = None;

        for segment in key.split('/') {
            let Some((name, value)) = segment.split_once('=') else {
                continue;
            };
            match name {
                "year" => year = value.parse::<i32>().ok(),
                "month" => month = value.parse::<u8>().ok(),
                "day" => day = value.parse::<u8>().ok(),
                _ => {}
            }
        }

        let partition = Self {
            year: year?,
            month: month?,
            day: day?,
        };
        partition.to_date().ok().map(|_| partition)
    }

    /// `year=YYYY/month=MM/day=DD`
    pub fn segments(self) -> String {
        format!(
            "year={:04}/month={:02}/day={:02}",
            self.year, self.month, self.day
        )
    }

    /// Compact `YYYYMMDD` form used in snapshot file names.
    pub fn compact(self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

impl Display for PartitionDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.to_date() {
            Ok(date) => f.write_str(&format_iso_date(date)),
            Err(_) => write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day),
        }
    }
}

/// Makes a share-class label safe to use as a path segment.
pub fn sanitize_class(label: &str) -> String {
    label.trim().replace([' ', '/'], "_")
}

/// Local file name of the raw snapshot for `date`.
pub fn raw_file_name(date: PartitionDate) -> String {
    format!("ibov_portfolio_{}.parquet", date.compact())
}

/// Storage key of a raw snapshot: `<prefix>year=YYYY/month=MM/day=DD/<file>`.
pub fn raw_object_key(prefix: &str, date: PartitionDate, file_name: &str) -> String {
    format!("{}{}/{}", normalize_prefix(prefix), date.segments(), file_name)
}

/// Relative directory holding every refined group of `date`.
pub fn refined_date_prefix(prefix: &str, date: PartitionDate) -> String {
    format!("{}{}", normalize_prefix(prefix), date.segments())
}

/// Relative path of one refined group file.
pub fn refined_object_key(prefix: &str, date: PartitionDate, class: &str) -> String {
    format!(
        "{}/class={}/{}",
        refined_date_prefix(prefix, date),
        sanitize_class(class),
        REFINED_PART_FILE
    )
}

/// Ensures a non-empty prefix ends with exactly one `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn segments_are_zero_padded() {
        let partition = PartitionDate::from_date(date!(2026 - 03 - 07));
        assert_eq!(partition.segments(), "year=2026/month=03/day=07");
        assert_eq!(partition.compact(), "20260307");
        assert_eq!(partition.to_string(), "2026-03-07");
    }

    #[test]
    fn extracts_partition_from_raw_key() {
        let key = "raw-data/year=2024/month=01/day=15/ibov_portfolio_20240115.parquet";
        let partition = PartitionDate::from_key(key).expect("partition");
        assert_eq!(
            partition,
            PartitionDate {
                year: 2024,
                month: 1,
                day: 15
            }
        );
    }

    #[test]
    fn rejects_partial_or_impossible_partitions() {
        assert!(PartitionDate::from_key("raw-data/year=2024/month=01/file.parquet").is_none());
        assert!(PartitionDate::from_key("raw-data/year=2024/month=02/day=30/x.parquet").is_none());
        assert!(PartitionDate::from_key("other-data/file.csv").is_none());
    }

    #[test]
    fn sanitizes_spaces_and_slashes() {
        assert_eq!(sanitize_class("PN N2"), "PN_N2");
        assert_eq!(sanitize_class("ON EJ/NM"), "ON_EJ_NM");
        assert_eq!(sanitize_class("ON"), "ON");
    }

    #[test]
    fn builds_raw_and_refined_keys() {
        let partition = PartitionDate::from_date(date!(2026 - 10 - 16));
        assert_eq!(
            raw_object_key("raw-data/", partition, &raw_file_name(partition)),
            "raw-data/year=2026/month=10/day=16/ibov_portfolio_20261016.parquet"
        );
        assert_eq!(
            refined_object_key("refined-data", partition, "PN N1"),
            "refined-data/year=2026/month=10/day=16/class=PN_N1/part-00000.parquet"
        );
        assert_eq!(
            refined_date_prefix("refined-data/", partition),
            "refined-data/year=2026/month=10/day=16"
        );
    }
}
