use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::config::{BackendConfig, Config};
use crate::error::{DiaryError, DiaryResult};
use crate::models::{DiaryEntry, EntryId, EntryUpdate, NewEntry};
use crate::postgrest::PostgrestClient;
use crate::remote::RemoteRepository;
use crate::repository::DiaryRepository;
use crate::sqlite::SqliteRepository;

/// Entry point for the diary UI.
///
/// Accepts loosely-typed field maps as submitted by a form and hands back
/// plain records. Which store sits behind it is decided once, from [`Config`].
pub struct DiaryService {
    repo: Box<dyn DiaryRepository>,
}

impl DiaryService {
    /// Open the backend named by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let repo: Box<dyn DiaryRepository> = match &config.backend {
            BackendConfig::Embedded { db_path } => Box::new(
                SqliteRepository::open(db_path)
                    .with_context(|| format!("Failed to open diary: {}", db_path.display()))?,
            ),
            BackendConfig::Remote(remote) => {
                let client = PostgrestClient::new(remote)
                    .context("Failed to set up remote diary client")?;
                Box::new(RemoteRepository::new(client))
            }
        };
        Ok(Self { repo })
    }

    pub fn with_repository(repo: impl DiaryRepository + 'static) -> Self {
        Self {
            repo: Box::new(repo),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.repo.backend()
    }

    #[must_use]
    pub fn repository(&self) -> &dyn DiaryRepository {
        self.repo.as_ref()
    }

    pub fn add_entry(&self, fields: &Map<String, Value>) -> DiaryResult<DiaryEntry> {
        let entry = NewEntry::from_fields(fields)?;
        self.repo.create(&entry)
    }

    pub fn list_entries(&self) -> DiaryResult<Vec<DiaryEntry>> {
        self.repo.get_all()
    }

    pub fn get_entry(&self, id: EntryId) -> DiaryResult<Option<DiaryEntry>> {
        self.repo.get_by_id(id)
    }

    pub fn entries_at(&self, timestamp: NaiveDateTime) -> DiaryResult<Vec<DiaryEntry>> {
        self.repo.get_by_date(timestamp)
    }

    /// Apply the keys present in `fields`; a `null` value clears that field.
    pub fn edit_entry(&self, id: EntryId, fields: &Map<String, Value>) -> DiaryResult<DiaryEntry> {
        let update = EntryUpdate::from_fields(fields)?;
        self.repo.update(id, &update)
    }

    pub fn remove_entry(&self, id: EntryId) -> DiaryResult<DiaryEntry> {
        self.repo.delete(id)
    }

    /// Like [`DiaryService::get_entry`], but absence is an error.
    pub fn require_entry(&self, id: EntryId) -> DiaryResult<DiaryEntry> {
        self.repo.get_by_id(id)?.ok_or(DiaryError::NotFound(id))
    }
}
