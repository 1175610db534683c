//! In-memory stand-in for a hosted table, shared by remote and import tests.

use std::cmp::Ordering;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};

use serde_json::{Map, Value};

use crate::models::{EntryId, parse_timestamp};
use crate::remote::{Filter, Query, TableClient, TableResponse};

type Rejector = Box<dyn Fn(&Map<String, Value>) -> Option<String> + Send + Sync>;

#[derive(Default)]
struct Table {
    rows: Vec<Map<String, Value>>,
    next_id: EntryId,
}

/// Behaves like a PostgREST table: identity ids, `eq` filters, ordering and
/// paging, with the affected rows returned from every write.
pub struct MemoryTable {
    table: Mutex<Table>,
    reject: Option<Rejector>,
    offline: AtomicBool,
    selects: AtomicUsize,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                rows: Vec::new(),
                next_id: 1,
            }),
            reject: None,
            offline: AtomicBool::new(false),
            selects: AtomicUsize::new(0),
        }
    }

    /// Refuse rows for which `check` returns a message, the way a constraint would.
    pub fn rejecting(
        mut self,
        check: impl Fn(&Map<String, Value>) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.reject = Some(Box::new(check));
        self
    }

    /// While offline every call fails as if the host were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    pub fn selects(&self) -> usize {
        self.selects.load(AtomicOrdering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, id: EntryId) -> Option<Map<String, Value>> {
        self.table
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|row| row.get("id").and_then(Value::as_i64) == Some(id))
            .cloned()
    }

    fn unreachable(&self) -> Option<TableResponse> {
        self.offline
            .load(AtomicOrdering::SeqCst)
            .then(|| TableResponse::failed(0, "connection refused"))
    }

    fn rejection(&self, row: &Map<String, Value>) -> Option<TableResponse> {
        let check = self.reject.as_ref()?;
        check(row).map(|message| TableResponse::failed(400, message))
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(row: &Map<String, Value>, filter: Option<&Filter>) -> bool {
    let Some(Filter::Eq(column, expected)) = filter else {
        return true;
    };
    match row.get(column) {
        Some(Value::String(s)) => match (parse_timestamp(s), parse_timestamp(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => s == expected,
        },
        Some(Value::Number(n)) => n.to_string() == *expected,
        _ => false,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, _) => Ordering::Greater,
        (_, Some(Value::Null) | None) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

impl TableClient for MemoryTable {
    fn insert(&self, row: &Map<String, Value>) -> TableResponse {
        if let Some(failure) = self.unreachable().or_else(|| self.rejection(row)) {
            return failure;
        }
        let mut table = self.table.lock().unwrap();
        let mut stored = row.clone();
        stored.insert("id".to_string(), Value::from(table.next_id));
        table.next_id += 1;
        table.rows.push(stored.clone());
        TableResponse::ok(201, vec![Value::Object(stored)])
    }

    fn select(&self, query: &Query) -> TableResponse {
        if let Some(failure) = self.unreachable() {
            return failure;
        }
        self.selects.fetch_add(1, AtomicOrdering::SeqCst);
        let table = self.table.lock().unwrap();
        let mut rows: Vec<&Map<String, Value>> = table
            .rows
            .iter()
            .filter(|row| matches(row, query.filter.as_ref()))
            .collect();
        rows.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|o| {
                    let ord = compare(a.get(&o.column), b.get(&o.column));
                    if o.descending { ord.reverse() } else { ord }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        let rows = rows
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|row| Value::Object(row.clone()))
            .collect();
        TableResponse::ok(200, rows)
    }

    fn update(&self, filter: &Filter, changes: &Map<String, Value>) -> TableResponse {
        if let Some(failure) = self.unreachable() {
            return failure;
        }
        let mut table = self.table.lock().unwrap();
        let mut updated = Vec::new();
        for row in table.rows.iter_mut().filter(|row| matches(row, Some(filter))) {
            let mut merged = row.clone();
            merged.extend(changes.clone());
            if let Some(failure) = self.rejection(&merged) {
                return failure;
            }
            *row = merged;
            updated.push(Value::Object(row.clone()));
        }
        TableResponse::ok(200, updated)
    }

    fn delete(&self, filter: &Filter) -> TableResponse {
        if let Some(failure) = self.unreachable() {
            return failure;
        }
        let mut table = self.table.lock().unwrap();
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut table.rows)
            .into_iter()
            .partition(|row| matches(row, Some(filter)));
        table.rows = kept;
        TableResponse::ok(200, removed.into_iter().map(Value::Object).collect())
    }
}
