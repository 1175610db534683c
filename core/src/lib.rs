pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod models;
pub mod postgrest;
pub mod remote;
pub mod repository;
pub mod schema;
pub mod service;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{DiaryError, DiaryResult, ErrorKind};
pub use models::{DiaryEntry, EntryId, EntryUpdate, NewEntry};
pub use repository::DiaryRepository;
pub use service::DiaryService;
