use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use noteworthy_core::{get_pending_migrations, Error, Migration};

/// Map an engine error that happened mid-operation.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Transient(e.to_string())
}

/// Open a connection, mapping any failure to `StorageUnavailable`.
pub(crate) fn open_connection(conn: rusqlite::Result<Connection>) -> Result<Connection, Error> {
    let conn = conn.map_err(|e| Error::StorageUnavailable(e.to_string()))?;
    conn.execute_batch("PRAGMA busy_timeout = 5000;")
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
    Ok(conn)
}

/// Run any pending migrations and record the new schema version in `_meta`.
///
/// Everything runs in one transaction, so a partially applied upgrade never
/// leaves the seed data half written.
pub(crate) fn run_migrations(
    conn: &mut Connection,
    migrations: &'static [Migration],
    target_version: i64,
) -> Result<(), Error> {
    let tx = conn
        .transaction()
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )
    .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

    let current_version: i64 = tx
        .query_row(
            "SELECT value FROM _meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| Error::StorageUnavailable(e.to_string()))?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    if current_version >= target_version {
        debug!(current_version, "schema up to date");
        return Ok(());
    }

    for migration in get_pending_migrations(migrations, current_version) {
        for statement in migration.statements {
            tx.execute(statement, []).map_err(|e| {
                Error::StorageUnavailable(format!("migration {} failed: {}", migration.name, e))
            })?;
        }
        info!(migration = migration.name, version = migration.version, "applied migration");
    }

    tx.execute(
        "INSERT OR REPLACE INTO _meta (key, value) VALUES ('schema_version', ?1)",
        params![target_version.to_string()],
    )
    .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

    tx.commit()
        .map_err(|e| Error::StorageUnavailable(e.to_string()))
}
