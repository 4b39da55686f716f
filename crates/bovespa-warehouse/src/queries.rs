//! Canned summary queries over the refined table.

use bovespa_core::catalog::validate_identifier;
use serde::Serialize;

use crate::{QueryGuardrails, QueryResult, Warehouse, WarehouseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryQuery {
    /// First rows of the table.
    BasicListing,
    /// Groups ordered by total theoretical quantity, largest first.
    QuantityRanking,
    /// One row of totals across every group.
    OverallStatistics,
}

impl SummaryQuery {
    pub const ALL: [Self; 3] = [
        Self::BasicListing,
        Self::QuantityRanking,
        Self::OverallStatistics,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::BasicListing => "basic_listing",
            Self::QuantityRanking => "quantity_ranking",
            Self::OverallStatistics => "overall_statistics",
        }
    }

    pub fn sql(self, table: &str) -> Result<String, WarehouseError> {
        validate_identifier(table)?;
        let sql = match self {
            Self::BasicListing => format!(
                "SELECT * FROM {table} ORDER BY \"year\", \"month\", \"day\", \"class\" LIMIT 5"
            ),
            Self::QuantityRanking => format!(
                r#"SELECT "class", count_in_class, total_theoretical_quantity, average_weight_percent
FROM {table}
ORDER BY total_theoretical_quantity DESC, "class""#
            ),
            Self::OverallStatistics => format!(
                r#"SELECT COUNT(*) AS class_count,
       CAST(SUM(count_in_class) AS BIGINT) AS constituent_count,
       SUM(total_theoretical_quantity) AS total_quantity,
       AVG(average_weight_percent) AS mean_weight_percent
FROM {table}"#
            ),
        };
        Ok(sql)
    }
}

/// Result of one summary query, with the SQL that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub name: &'static str,
    pub sql: String,
    pub result: QueryResult,
}

impl Warehouse {
    /// Runs every [`SummaryQuery`] read-only against `table`.
    pub fn run_summaries(
        &self,
        table: &str,
        guardrails: QueryGuardrails,
    ) -> Result<Vec<SummaryResult>, WarehouseError> {
        SummaryQuery::ALL
            .iter()
            .map(|query| {
                let sql = query.sql(table)?;
                let result = self.execute_query(&sql, guardrails)?;
                tracing::debug!(query = query.name(), rows = result.row_count, "summary query executed");
                Ok(SummaryResult {
                    name: query.name(),
                    sql,
                    result,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn summary_sql_targets_the_table() {
        let sql = SummaryQuery::QuantityRanking
            .sql("bovespa_refined_data")
            .expect("valid table");
        assert!(sql.contains("FROM bovespa_refined_data"));
        assert!(sql.contains("ORDER BY total_theoretical_quantity DESC"));
    }

    #[test]
    fn rejects_unsafe_table_names() {
        assert!(SummaryQuery::BasicListing.sql("t; DROP TABLE x").is_err());
    }

    #[test]
    fn names_are_unique() {
        let names: BTreeSet<&str> = SummaryQuery::ALL.iter().map(|query| query.name()).collect();
        assert_eq!(names.len(), SummaryQuery::ALL.len());
    }
}
