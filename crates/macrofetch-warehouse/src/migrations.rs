use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_collection_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS observations (
    date DATE NOT NULL,
    symbol TEXT NOT NULL,
    source TEXT NOT NULL,
    value DOUBLE NOT NULL,
    extras TEXT,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(date, symbol, source)
);

CREATE TABLE IF NOT EXISTS symbols (
    source TEXT NOT NULL,
    symbol TEXT NOT NULL,
    description TEXT,
    unit TEXT,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(source, symbol)
);

CREATE TABLE IF NOT EXISTS collection_artifacts (
    run_id TEXT NOT NULL,
    run_label TEXT NOT NULL,
    kind TEXT NOT NULL,
    source TEXT,
    path TEXT NOT NULL,
    row_count BIGINT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_collection_artifacts_run ON collection_artifacts(run_id);
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
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
