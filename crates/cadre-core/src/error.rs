use uuid::Uuid;

/// Crate-level error type for `cadre-core`.
///
/// Mirrors the error-kind table in §7 of the design: validation failures
/// never create a row, contention is a silent no-op at the call site (not
/// an error at all — see `store::claim_step`), and everything else here is
/// a hard I/O or not-found failure that callers log and continue past.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("datastore error: {0}")]
    Datastore(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<tokio_rusqlite::Error> for CoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        CoreError::Datastore(err.to_string())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Datastore(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}
