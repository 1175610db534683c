use thiserror::Error;

use crate::models::EntryId;

pub type DiaryResult<T> = Result<T, DiaryError>;

/// The three outcomes a caller has to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input is structurally invalid. Retrying with the same input fails again.
    Validation,
    /// The target record does not exist. Nothing was mutated.
    NotFound,
    /// The backing store could not complete the operation. May be transient.
    Storage,
}

#[derive(Debug, Error)]
pub enum DiaryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("diary entry {0} not found")]
    NotFound(EntryId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DiaryError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}

impl From<rusqlite::Error> for DiaryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(err))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("field '{0}' is not a diary entry field")]
    UnknownField(String),
    #[error("field '{0}' is assigned by the store and cannot be set")]
    ImmutableField(&'static str),
    #[error("field 'timestamp' is required")]
    MissingTimestamp,
    #[error("field '{field}' {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("rejected by the store: {0}")]
    Rejected(String),
}

impl ValidationError {
    /// Name of the offending field, when the failure is tied to one.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::UnknownField(name) => Some(name.as_str()),
            Self::ImmutableField(name) | Self::InvalidValue { field: name, .. } => Some(*name),
            Self::MissingTimestamp => Some("timestamp"),
            Self::Rejected(_) => None,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("remote store returned {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("remote store unreachable: {0}")]
    Transport(String),
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
}
