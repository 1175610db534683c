//! Diary entries in a hosted table reached over a PostgREST-style API.
//!
//! [`TableClient`] is the wire seam: it never fails, it answers every call
//! with a [`TableResponse`]. [`RemoteRepository`] turns those responses into
//! the crate's error taxonomy.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DiaryError, DiaryResult, StorageError, ValidationError};
use crate::models::{DiaryEntry, EntryId, EntryUpdate, Field, FieldValue, NewEntry, format_iso};
use crate::repository::DiaryRepository;

/// Rows requested per page when listing the whole table.
pub const PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `column = value`, with the value in its query-string form.
    Eq(String, String),
}

impl Filter {
    #[must_use]
    pub fn id(id: EntryId) -> Self {
        Filter::Eq("id".to_string(), id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    #[must_use]
    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    /// Newest first, ties broken by id.
    #[must_use]
    pub fn newest_first(filter: Option<Filter>) -> Self {
        Self {
            filter,
            order: vec![Order::desc("timestamp"), Order::desc("id")],
            ..Self::default()
        }
    }
}

/// Outcome of one table call. `status` is the HTTP status, or 0 when the
/// request never reached the service.
#[derive(Debug, Clone, PartialEq)]
pub struct TableResponse {
    pub success: bool,
    pub status: u16,
    pub rows: Vec<Value>,
    pub error: Option<String>,
}

impl TableResponse {
    #[must_use]
    pub fn ok(status: u16, rows: Vec<Value>) -> Self {
        Self {
            success: true,
            status,
            rows,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(status: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            rows: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Row-level access to one remote table. Writes return the affected rows.
pub trait TableClient: Send + Sync {
    fn insert(&self, row: &Map<String, Value>) -> TableResponse;
    fn select(&self, query: &Query) -> TableResponse;
    fn update(&self, filter: &Filter, changes: &Map<String, Value>) -> TableResponse;
    fn delete(&self, filter: &Filter) -> TableResponse;
}

pub struct RemoteRepository<C> {
    client: C,
}

impl<C: TableClient> RemoteRepository<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn first(&self, filter: Filter) -> DiaryResult<Option<DiaryEntry>> {
        let query = Query {
            limit: Some(1),
            ..Query::newest_first(Some(filter))
        };
        let rows = into_rows(self.client.select(&query))?;
        rows.into_iter().next().map(decode).transpose()
    }
}

/// `active_insulin` has no remote column, so it is never sent.
fn payload(values: Vec<(Field, FieldValue)>) -> Map<String, Value> {
    values
        .into_iter()
        .filter(|(field, _)| *field != Field::ActiveInsulin)
        .map(|(field, value)| (field.name().to_string(), value.to_json()))
        .collect()
}

fn into_rows(response: TableResponse) -> DiaryResult<Vec<Value>> {
    if response.success {
        return Ok(response.rows);
    }
    let message = response
        .error
        .unwrap_or_else(|| format!("request failed with status {}", response.status));
    let err = match response.status {
        400 | 409 | 422 => DiaryError::Validation(ValidationError::Rejected(message)),
        0 => StorageError::Transport(message).into(),
        status => StorageError::Remote { status, message }.into(),
    };
    Err(err)
}

fn decode(row: Value) -> DiaryResult<DiaryEntry> {
    let mut entry: DiaryEntry =
        serde_json::from_value(row).map_err(|e| StorageError::Decode(e.to_string()))?;
    entry.active_insulin = None;
    Ok(entry)
}

fn decode_all(rows: Vec<Value>) -> DiaryResult<Vec<DiaryEntry>> {
    rows.into_iter().map(decode).collect()
}

impl<C: TableClient> DiaryRepository for RemoteRepository<C> {
    fn backend(&self) -> &'static str {
        "supabase"
    }

    fn create(&self, entry: &NewEntry) -> DiaryResult<DiaryEntry> {
        entry.validate()?;
        let rows = into_rows(self.client.insert(&payload(entry.values())))?;
        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Decode("insert returned no row".to_string()))?;
        let created = decode(created)?;
        debug!(id = created.id, "created remote diary entry");
        Ok(created)
    }

    /// Pages until an empty page comes back. Servers may cap a page below
    /// `PAGE_SIZE`, so a short page does not mean the table is exhausted.
    fn get_all(&self) -> DiaryResult<Vec<DiaryEntry>> {
        let mut entries = Vec::new();
        loop {
            let query = Query {
                limit: Some(PAGE_SIZE),
                offset: Some(entries.len()),
                ..Query::newest_first(None)
            };
            let rows = into_rows(self.client.select(&query))?;
            if rows.is_empty() {
                break;
            }
            entries.extend(decode_all(rows)?);
        }
        Ok(entries)
    }

    fn get_by_id(&self, id: EntryId) -> DiaryResult<Option<DiaryEntry>> {
        self.first(Filter::id(id))
    }

    fn get_by_date(&self, timestamp: NaiveDateTime) -> DiaryResult<Vec<DiaryEntry>> {
        let filter = Filter::Eq(Field::Timestamp.name().to_string(), format_iso(timestamp));
        let rows = into_rows(self.client.select(&Query::newest_first(Some(filter))))?;
        decode_all(rows)
    }

    fn update(&self, id: EntryId, update: &EntryUpdate) -> DiaryResult<DiaryEntry> {
        update.validate()?;
        let changes = payload(update.changes());
        if changes.is_empty() {
            return self.get_by_id(id)?.ok_or(DiaryError::NotFound(id));
        }

        let rows = into_rows(self.client.update(&Filter::id(id), &changes))?;
        let updated = rows.into_iter().next().ok_or(DiaryError::NotFound(id))?;
        let updated = decode(updated)?;
        debug!(id, "updated remote diary entry");
        Ok(updated)
    }

    fn delete(&self, id: EntryId) -> DiaryResult<DiaryEntry> {
        let rows = into_rows(self.client.delete(&Filter::id(id)))?;
        let deleted = rows.into_iter().next().ok_or(DiaryError::NotFound(id))?;
        debug!(id, "deleted remote diary entry");
        decode(deleted)
    }
}
