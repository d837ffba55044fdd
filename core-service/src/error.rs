use core_catalog::CatalogError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl CoreError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Catalog(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
