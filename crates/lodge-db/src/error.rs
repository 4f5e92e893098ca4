use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

/// Typed outcomes for store operations. Handlers map these onto HTTP
/// statuses. Per-row enrichment failures never reach this type; they are
/// handled by drop-or-degrade at the service layer.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("caller is not the original author")]
    Forbidden,

    #[error("invalid container reference: {0}")]
    InvalidReference(&'static str),

    #[error("malformed pagination cursor")]
    InvalidCursor,

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
