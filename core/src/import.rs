//! One-shot copy of an embedded diary into another store.
//!
//! The source file is only ever read. Each record is replayed through the
//! target's `create`, so a record the target refuses is reported and skipped
//! while the rest of the batch carries on.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::models::{EntryId, Field, NewEntry};
use crate::repository::DiaryRepository;
use crate::schema::{ENTRIES_TABLE, existing_columns};

/// Failures listed individually in a report; the rest are only counted.
const MAX_LISTED_FAILURES: usize = 5;

const PROGRESS_EVERY: usize = 10;

/// A source record that did not make it into the target.
#[derive(Debug, Clone)]
pub struct ImportFailure {
    /// 1-based position in the import order.
    pub position: usize,
    pub source_id: Option<EntryId>,
    /// The record's column values as read from the source.
    pub record: Value,
    pub reason: String,
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_id {
            Some(id) => write!(f, "record #{} (id {id}): {}", self.position, self.reason),
            None => write!(f, "record #{}: {}", self.position, self.reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub attempted: usize,
    pub migrated: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Imported {} of {} records", self.migrated, self.attempted)?;
        if self.failures.is_empty() {
            return Ok(());
        }
        write!(f, "\n{} failed:", self.failures.len())?;
        for failure in self.failures.iter().take(MAX_LISTED_FAILURES) {
            write!(f, "\n  - {failure}")?;
        }
        if self.failures.len() > MAX_LISTED_FAILURES {
            write!(f, "\n  ... and {} more", self.failures.len() - MAX_LISTED_FAILURES)?;
        }
        Ok(())
    }
}

/// Record counts on both sides of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportVerification {
    pub source_count: usize,
    pub target_count: usize,
}

impl ImportVerification {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.source_count == self.target_count
    }
}

fn open_source(source: &Path) -> Result<Connection> {
    if !source.exists() {
        bail!("Source diary not found: {}", source.display());
    }
    let conn = Connection::open_with_flags(
        source,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open source diary: {}", source.display()))?;

    let columns = existing_columns(&conn)
        .with_context(|| format!("Failed to inspect source diary: {}", source.display()))?;
    if columns.is_empty() {
        bail!("Source diary has no {ENTRIES_TABLE} table: {}", source.display());
    }
    Ok(conn)
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(r) => serde_json::Number::from_f64(r).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} byte blob>", b.len())),
    }
}

/// Every source record as a column-name → value map, oldest first.
fn read_records(conn: &Connection) -> Result<Vec<Map<String, Value>>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT * FROM {ENTRIES_TABLE} ORDER BY timestamp ASC, id ASC"
        ))
        .context("Failed to query source diary")?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let records = stmt
        .query_map([], |row| {
            let mut record = Map::new();
            for (i, name) in names.iter().enumerate() {
                record.insert(name.clone(), json_value(row.get_ref(i)?));
            }
            Ok(record)
        })
        .context("Failed to read source diary")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read source diary")?;
    Ok(records)
}

/// The record with `id` and any column this release does not know dropped.
fn entry_fields(record: &Map<String, Value>) -> Map<String, Value> {
    record
        .iter()
        .filter(|(name, _)| Field::from_name(name).is_some())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Copy every record in the embedded diary at `source` into `target`.
///
/// Fails only if the source cannot be read at all. Individual records that
/// cannot be decoded or are refused by the target are collected in the report.
pub fn import_into(source: &Path, target: &dyn DiaryRepository) -> Result<ImportReport> {
    let conn = open_source(source)?;
    let records = read_records(&conn)?;
    drop(conn);

    let total = records.len();
    info!(
        source = %source.display(),
        target = target.backend(),
        total,
        "starting diary import"
    );

    let mut report = ImportReport {
        attempted: total,
        ..ImportReport::default()
    };

    for (index, raw) in records.into_iter().enumerate() {
        let position = index + 1;
        let source_id = raw.get("id").and_then(Value::as_i64);

        let outcome = NewEntry::from_fields(&entry_fields(&raw))
            .map_err(|e| e.to_string())
            .and_then(|entry| target.create(&entry).map_err(|e| e.to_string()));

        match outcome {
            Ok(created) => {
                report.migrated += 1;
                debug!(position, ?source_id, new_id = created.id, "imported record");
                if report.migrated % PROGRESS_EVERY == 0 {
                    info!(migrated = report.migrated, total, "import progress");
                }
            }
            Err(reason) => {
                warn!(position, ?source_id, %reason, "record not imported");
                report.failures.push(ImportFailure {
                    position,
                    source_id,
                    record: Value::Object(raw),
                    reason,
                });
            }
        }
    }

    info!(
        migrated = report.migrated,
        failed = report.failures.len(),
        "diary import finished"
    );
    Ok(report)
}

/// Compare record counts between the source diary and `target`.
///
/// A mismatch is logged and reported, not treated as an error.
pub fn verify_import(source: &Path, target: &dyn DiaryRepository) -> Result<ImportVerification> {
    let conn = open_source(source)?;
    let source_count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {ENTRIES_TABLE}"), [], |row| row.get(0))
        .context("Failed to count source records")?;
    let target_count = target
        .count()
        .context("Failed to count target records")?;

    let verification = ImportVerification {
        source_count: usize::try_from(source_count).unwrap_or_default(),
        target_count,
    };
    if verification.is_consistent() {
        info!(count = target_count, "import verified");
    } else {
        warn!(
            source_count = verification.source_count,
            target_count, "record counts differ after import"
        );
    }
    Ok(verification)
}
