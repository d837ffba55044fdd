use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Cycle found: {field} - collection {item_id} already contains collection {collection_id}")]
    Cycle {
        field: String,
        collection_id: String,
        item_id: String,
    },

    #[error("Authority {authority_id} is locked by another refresh")]
    LockContention { authority_id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl CatalogError {
    pub(crate) fn not_found(entity_type: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.into(),
        }
    }

    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether retrying the whole operation may succeed.
    ///
    /// Lock contention and transient storage conditions (busy/locked database,
    /// pool exhaustion) are retryable; validation and not-found errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LockContention { .. } => true,
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            Self::Database(err) => is_busy(err),
            _ => false,
        }
    }
}

/// Whether the database reported a busy or locked condition
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| is_busy_code(code.as_ref()))
            .unwrap_or(false),
        _ => false,
    }
}

// SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes.
fn is_busy_code(code: &str) -> bool {
    match code.parse::<i32>() {
        Ok(code) => matches!(code & 0xff, 5 | 6),
        Err(_) => false,
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
