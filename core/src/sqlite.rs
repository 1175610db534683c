use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params, params_from_iter};
use tracing::{debug, info, warn};

use crate::error::{DiaryError, DiaryResult, StorageError};
use crate::models::{
    DiaryEntry, EntryId, EntryUpdate, Field, FieldValue, NewEntry, SQLITE_TIMESTAMP_FORMAT,
    format_sqlite,
};
use crate::repository::DiaryRepository;
use crate::schema::{BUSY_TIMEOUT, ENTRIES_TABLE, create_table_sql, migrate_schema};

/// Diary entries in a local SQLite file.
///
/// Holds only the path. Every call opens its own connection, so nothing is
/// shared between callers and no transaction outlives the call that began it.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    path: PathBuf,
}

impl SqliteRepository {
    /// Open (or create) the store at `path`, migrating an older schema first.
    pub fn open(path: impl Into<PathBuf>) -> DiaryResult<Self> {
        let path = path.into();
        let outcome = migrate_schema(&path);
        debug!(path = %path.display(), ?outcome, "schema check finished");

        let repo = Self { path };
        repo.connect()?.execute_batch(&create_table_sql())?;
        info!(path = %repo.path.display(), "opened embedded diary store");
        Ok(repo)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> DiaryResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Run `f` in a transaction, committing on success and rolling back otherwise.
    fn write<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Transaction<'_>) -> DiaryResult<T>,
    ) -> DiaryResult<T> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                warn!(op, error = %err, "rolling back diary write");
                if let Err(rollback) = tx.rollback() {
                    warn!(op, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

fn select_sql(filter: &str) -> String {
    let columns: Vec<&str> = Field::ALL.iter().map(|f| f.name()).collect();
    format!(
        "SELECT id, {} FROM {ENTRIES_TABLE} {filter} ORDER BY timestamp DESC, id DESC",
        columns.join(", ")
    )
}

fn entry_from_row(row: &Row) -> rusqlite::Result<DiaryEntry> {
    let raw: String = row.get("timestamp")?;
    let timestamp = NaiveDateTime::parse_from_str(&raw, SQLITE_TIMESTAMP_FORMAT)
        .or_else(|_| {
            crate::models::parse_timestamp(&raw).ok_or(format!("unreadable timestamp '{raw}'"))
        })
        .map_err(|msg| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                msg.into(),
            )
        })?;

    Ok(DiaryEntry {
        id: row.get("id")?,
        timestamp,
        meal_type: row.get("meal_type")?,
        food_name: row.get("food_name")?,
        quantity: row.get("quantity")?,
        unit: row.get("unit")?,
        carbohydrates_g: row.get("carbohydrates_g")?,
        glucose_before: row.get("glucose_before")?,
        glucose_after_2h: row.get("glucose_after_2h")?,
        insulin_units: row.get("insulin_units")?,
        active_insulin: row.get("active_insulin")?,
        corrective_dose: row.get("corrective_dose")?,
        corrective_dose_delay_min: row.get("corrective_dose_delay_min")?,
        notes: row.get("notes")?,
    })
}

/// Conversion failures mean a stored row is malformed, not that the store is down.
fn read_error(err: rusqlite::Error) -> DiaryError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(_, _, cause) => {
            StorageError::Decode(cause.to_string()).into()
        }
        other => other.into(),
    }
}

fn sql_value(value: FieldValue) -> SqlValue {
    match value {
        FieldValue::Null => SqlValue::Null,
        FieldValue::Text(s) => SqlValue::Text(s),
        FieldValue::Real(v) => SqlValue::Real(v),
        FieldValue::Integer(v) => SqlValue::Integer(v),
        FieldValue::Timestamp(ts) => SqlValue::Text(format_sqlite(ts)),
    }
}

fn fetch(conn: &Connection, id: EntryId) -> DiaryResult<Option<DiaryEntry>> {
    let entry = conn
        .query_row(&select_sql("WHERE id = ?1"), params![id], entry_from_row)
        .optional()
        .map_err(read_error)?;
    Ok(entry)
}

fn fetch_where(conn: &Connection, filter: &str, args: &[SqlValue]) -> DiaryResult<Vec<DiaryEntry>> {
    let mut stmt = conn.prepare(&select_sql(filter))?;
    let entries = stmt
        .query_map(params_from_iter(args), entry_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)?;
    Ok(entries)
}

impl DiaryRepository for SqliteRepository {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn create(&self, entry: &NewEntry) -> DiaryResult<DiaryEntry> {
        entry.validate()?;
        let values = entry.values();
        let columns: Vec<&str> = values.iter().map(|(f, _)| f.name()).collect();
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {ENTRIES_TABLE} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        let args: Vec<SqlValue> = values.into_iter().map(|(_, v)| sql_value(v)).collect();

        let created = self.write("create", |tx| {
            tx.execute(&sql, params_from_iter(args))?;
            let id = tx.last_insert_rowid();
            fetch(tx, id)?.ok_or(DiaryError::NotFound(id))
        })?;
        debug!(id = created.id, "created diary entry");
        Ok(created)
    }

    fn get_all(&self) -> DiaryResult<Vec<DiaryEntry>> {
        fetch_where(&self.connect()?, "", &[])
    }

    fn get_by_id(&self, id: EntryId) -> DiaryResult<Option<DiaryEntry>> {
        fetch(&self.connect()?, id)
    }

    /// Older rows may lack fractional seconds, so candidates are matched to the
    /// second in SQL and then compared exactly on the decoded value.
    fn get_by_date(&self, timestamp: NaiveDateTime) -> DiaryResult<Vec<DiaryEntry>> {
        let candidates = fetch_where(
            &self.connect()?,
            "WHERE datetime(timestamp) = datetime(?1)",
            &[SqlValue::Text(format_sqlite(timestamp))],
        )?;
        Ok(candidates
            .into_iter()
            .filter(|entry| entry.timestamp == timestamp)
            .collect())
    }

    fn update(&self, id: EntryId, update: &EntryUpdate) -> DiaryResult<DiaryEntry> {
        update.validate()?;
        let changes = update.changes();

        let updated = self.write("update", |tx| {
            let current = fetch(tx, id)?.ok_or(DiaryError::NotFound(id))?;
            if changes.is_empty() {
                return Ok(current);
            }

            let assignments: Vec<String> = changes
                .iter()
                .enumerate()
                .map(|(i, (field, _))| format!("{} = ?{}", field.name(), i + 1))
                .collect();
            let sql = format!(
                "UPDATE {ENTRIES_TABLE} SET {} WHERE id = ?{}",
                assignments.join(", "),
                changes.len() + 1
            );
            let mut args: Vec<SqlValue> =
                changes.into_iter().map(|(_, v)| sql_value(v)).collect();
            args.push(SqlValue::Integer(id));

            tx.execute(&sql, params_from_iter(args))?;
            fetch(tx, id)?.ok_or(DiaryError::NotFound(id))
        })?;
        debug!(id, "updated diary entry");
        Ok(updated)
    }

    fn delete(&self, id: EntryId) -> DiaryResult<DiaryEntry> {
        let deleted = self.write("delete", |tx| {
            let current = fetch(tx, id)?.ok_or(DiaryError::NotFound(id))?;
            tx.execute(
                &format!("DELETE FROM {ENTRIES_TABLE} WHERE id = ?1"),
                params![id],
            )?;
            Ok(current)
        })?;
        debug!(id, "deleted diary entry");
        Ok(deleted)
    }

    fn count(&self) -> DiaryResult<usize> {
        let count: i64 = self.connect()?.query_row(
            &format!("SELECT COUNT(*) FROM {ENTRIES_TABLE}"),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
