use chrono::NaiveDateTime;

use crate::error::DiaryResult;
use crate::models::{DiaryEntry, EntryId, EntryUpdate, NewEntry};

/// The single sanctioned path for reading and writing diary entries.
///
/// Implemented by the embedded SQLite store and the remote table store. Both
/// report failures through [`crate::error::DiaryError`], so callers never need
/// to know which one is active.
pub trait DiaryRepository: Send + Sync {
    /// Short backend label for display.
    fn backend(&self) -> &'static str;

    /// Store a new entry and return it as stored, with its assigned id.
    fn create(&self, entry: &NewEntry) -> DiaryResult<DiaryEntry>;

    /// Every entry, newest first.
    fn get_all(&self) -> DiaryResult<Vec<DiaryEntry>>;

    fn get_by_id(&self, id: EntryId) -> DiaryResult<Option<DiaryEntry>>;

    /// Entries whose timestamp equals `timestamp` exactly.
    fn get_by_date(&self, timestamp: NaiveDateTime) -> DiaryResult<Vec<DiaryEntry>>;

    /// Apply a partial update and return the record as stored afterwards.
    fn update(&self, id: EntryId, update: &EntryUpdate) -> DiaryResult<DiaryEntry>;

    /// Remove an entry, returning it as it was just before deletion.
    fn delete(&self, id: EntryId) -> DiaryResult<DiaryEntry>;

    fn count(&self) -> DiaryResult<usize> {
        Ok(self.get_all()?.len())
    }
}
