//! Catalog registration payload for the refined table.

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Partition columns of the refined layout, outermost first.
pub const REFINED_PARTITION_KEYS: [&str; 4] = ["year", "month", "day", "class"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: String,
}

impl ColumnSpec {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_owned(),
            data_type: data_type.to_owned(),
        }
    }
}

/// Everything a catalog needs to expose a partitioned parquet location as a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRegistration {
    pub database: String,
    pub table: String,
    pub location: String,
    pub format: String,
    pub partition_keys: Vec<String>,
    pub columns: Vec<ColumnSpec>,
}

impl CatalogRegistration {
    /// Registration for the aggregated refined records stored at `location`.
    pub fn refined(
        database: &str,
        table: &str,
        location: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        validate_identifier(database)?;
        validate_identifier(table)?;

        Ok(Self {
            database: database.to_owned(),
            table: table.to_owned(),
            location: location.into(),
            format: String::from("parquet"),
            partition_keys: REFINED_PARTITION_KEYS
                .iter()
                .map(|key| (*key).to_owned())
                .collect(),
            columns: refined_columns(),
        })
    }
}

/// Columns of every refined group file, in file order.
pub fn refined_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("class", "string"),
        ColumnSpec::new("year", "int"),
        ColumnSpec::new("month", "int"),
        ColumnSpec::new("day", "int"),
        ColumnSpec::new("total_theoretical_quantity", "double"),
        ColumnSpec::new("average_weight_percent", "double"),
        ColumnSpec::new("count_in_class", "bigint"),
    ]
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, safe to splice into SQL unquoted.
pub fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier {
            value: value.to_owned(),
        })
    }
}
