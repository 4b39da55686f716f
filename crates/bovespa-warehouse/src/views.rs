//! Views exposing registered parquet locations as queryable tables.

use std::path::Path;

use ::duckdb::Connection;
use bovespa_core::catalog::validate_identifier;
use bovespa_core::CatalogRegistration;

use crate::{escape_sql_string, path_to_sql, WarehouseError};

/// (Re)creates the view `<table>` over every parquet file below the location.
///
/// Partition values are read from the file columns, not from directory names.
///
/// # Errors
/// Fails when the table name is not a plain identifier or the location has
/// no parquet files yet.
pub fn create_catalog_view(
    connection: &Connection,
    registration: &CatalogRegistration,
) -> Result<(), WarehouseError> {
    validate_identifier(&registration.table)?;

    let glob = format!(
        "{}/**/*.parquet",
        path_to_sql(Path::new(&registration.location)).trim_end_matches('/')
    );
    let sql = format!(
        r#"
CREATE OR REPLACE VIEW {table} AS
SELECT {columns}
FROM read_parquet('{glob}', hive_partitioning = false, union_by_name = true);
"#,
        table = registration.table,
        columns = select_list(registration)?,
        glob = escape_sql_string(&glob),
    );
    connection.execute_batch(&sql)?;
    Ok(())
}

/// Recreates views for every registration stored in `catalog_tables`.
///
/// Locations that no longer hold data are skipped with a warning.
pub fn refresh_catalog_views(connection: &Connection) -> Result<usize, WarehouseError> {
    let registrations = crate::load_registrations(connection)?;
    let mut refreshed = 0;
    for registration in &registrations {
        match create_catalog_view(connection, registration) {
            Ok(()) => refreshed += 1,
            Err(error) => tracing::warn!(
                table = %registration.table,
                location = %registration.location,
                %error,
                "catalog view not refreshed"
            ),
        }
    }
    Ok(refreshed)
}

fn select_list(registration: &CatalogRegistration) -> Result<String, WarehouseError> {
    if registration.columns.is_empty() {
        return Ok(String::from("*"));
    }

    registration
        .columns
        .iter()
        .map(|column| {
            validate_identifier(&column.name)?;
            Ok(format!("\"{}\"", column.name))
        })
        .collect::<Result<Vec<_>, WarehouseError>>()
        .map(|columns| columns.join(", "))
}
