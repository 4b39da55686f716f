use ::duckdb::Connection;

use crate::escape_sql_string;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_catalog",
        sql: r#"
CREATE TABLE IF NOT EXISTS catalog_tables (
    database_name TEXT NOT NULL,
    table_name TEXT NOT NULL,
    location TEXT NOT NULL,
    format TEXT NOT NULL,
    partition_keys TEXT NOT NULL,
    columns TEXT NOT NULL,
    registered_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(database_name, table_name)
);
"#,
    },
    Migration {
        version: "0002_transform_runs",
        sql: r#"
CREATE TABLE IF NOT EXISTS transform_runs (
    run_id TEXT PRIMARY KEY,
    job_name TEXT NOT NULL,
    input_path TEXT NOT NULL,
    output_root TEXT NOT NULL,
    groups_written BIGINT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,
    started_at TIMESTAMP NOT NULL,
    finished_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_transform_runs_status ON transform_runs(status, started_at);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;
        if applied > 0 {
            continue;
        }

        connection.execute_batch(migration.sql)?;
        connection.execute_batch(&format!(
            "INSERT INTO schema_migrations (version) VALUES ('{}')",
            escape_sql_string(migration.version)
        ))?;
        tracing::debug!(version = migration.version, "applied warehouse migration");
    }

    Ok(())
}
