//! Errors shared across port boundaries

use arka_core::Segment;
use thiserror::Error;

/// Price store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Token {token} out of range for {segment} ({min}..={max})")]
    TokenOutOfRange { segment: Segment, token: u32, min: u32, max: u32 },

    #[error("Store for {0} not initialized")]
    NotInitialized(Segment),

    #[error("Store for {0} already initialized")]
    AlreadyInitialized(Segment),
}

/// Persistence collaborator errors.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(e: std::io::Error) -> Self {
        RepositoryError::Storage(e.to_string())
    }
}
