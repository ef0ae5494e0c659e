pub mod payload;
pub mod service;

pub use payload::{ReadParams, ReadingPayload};
pub use service::{QueryDefaults, ReadingService, ReadingsPage};

/// Failures of the ingestion/query path.
#[derive(Debug, thiserror::Error)]
pub enum ReadingError {
    /// Input rejected before touching storage.
    #[error("invalid reading: {0}")]
    Validation(String),

    /// A reading with the same `(sensor, recorded_timestamp)` already exists.
    #[error("possible duplicate")]
    DuplicateKey,

    #[error("storage unavailable")]
    StorageUnavailable(#[source] sqlx::Error),
}

impl From<sqlx::Error> for ReadingError {
    fn from(e: sqlx::Error) -> Self {
        let duplicate = e
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());
        if duplicate {
            Self::DuplicateKey
        } else {
            Self::StorageUnavailable(e)
        }
    }
}
