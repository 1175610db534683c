//! Physical schema of the embedded store and its additive migrator.
//!
//! The entries table only ever gains nullable columns. Columns are never
//! dropped, renamed, or retyped, so stores written by any earlier release stay
//! readable.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::models::{Field, FieldKind};

pub const ENTRIES_TABLE: &str = "diary_entries";

/// How long any connection waits on another writer's lock before giving up.
pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQL type for a field's column. Everything except the timestamp is nullable.
#[must_use]
pub fn column_type(field: Field) -> &'static str {
    match field.kind() {
        FieldKind::Timestamp | FieldKind::Text => "TEXT",
        FieldKind::Real => "REAL",
        FieldKind::Integer => "INTEGER",
    }
}

/// Columns the migrator may add: every field except the required timestamp.
fn optional_fields() -> impl Iterator<Item = Field> {
    Field::ALL.into_iter().filter(|f| *f != Field::Timestamp)
}

pub(crate) fn create_table_sql() -> String {
    let mut columns = vec![
        "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        format!("{} TEXT NOT NULL", Field::Timestamp.name()),
    ];
    columns.extend(optional_fields().map(|f| format!("{} {}", f.name(), column_type(f))));
    format!(
        "CREATE TABLE IF NOT EXISTS {ENTRIES_TABLE} (\n    {}\n);\n\
         CREATE INDEX IF NOT EXISTS idx_{ENTRIES_TABLE}_timestamp ON {ENTRIES_TABLE}(timestamp);",
        columns.join(",\n    ")
    )
}

/// Column names physically present in the entries table, empty if it does not exist.
pub(crate) fn existing_columns(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({ENTRIES_TABLE})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The store file does not exist yet.
    NoStore,
    /// The file exists but has no entries table.
    NoTable,
    UpToDate,
    Added(Vec<&'static str>),
    /// Inspection or alteration failed and was downgraded to a no-op.
    Degraded(String),
}

/// Bring an existing store's entries table up to the current column set.
///
/// Never fails: errors are logged and reported as [`MigrationOutcome::Degraded`],
/// leaving table creation to surface a store that is truly unusable.
pub fn migrate_schema(path: &Path) -> MigrationOutcome {
    if !path.exists() {
        debug!(path = %path.display(), "no store yet, skipping schema migration");
        return MigrationOutcome::NoStore;
    }

    match try_migrate(path) {
        Ok(outcome) => {
            if let MigrationOutcome::Added(columns) = &outcome {
                info!(path = %path.display(), ?columns, "added missing diary columns");
            }
            outcome
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "schema migration skipped");
            MigrationOutcome::Degraded(err.to_string())
        }
    }
}

fn try_migrate(path: &Path) -> rusqlite::Result<MigrationOutcome> {
    let mut conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    let present: HashSet<String> = existing_columns(&conn)?.into_iter().collect();
    if present.is_empty() {
        return Ok(MigrationOutcome::NoTable);
    }

    let missing: Vec<Field> = optional_fields()
        .filter(|f| !present.contains(f.name()))
        .collect();
    if missing.is_empty() {
        return Ok(MigrationOutcome::UpToDate);
    }

    let tx = conn.transaction()?;
    for field in &missing {
        tx.execute_batch(&format!(
            "ALTER TABLE {ENTRIES_TABLE} ADD COLUMN {} {};",
            field.name(),
            column_type(*field)
        ))?;
    }
    tx.commit()?;

    Ok(MigrationOutcome::Added(
        missing.into_iter().map(Field::name).collect(),
    ))
}
