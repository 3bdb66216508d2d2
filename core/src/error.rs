use sled::transaction::TransactionError;

use crate::query::QueryError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("source already indexed: {0}")]
    DuplicateSource(String),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("metadata error: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("corrupt index data: {0}")]
    Corrupt(String),
}

impl Error {
    pub(crate) fn document_not_found(doc_id: crate::DocId) -> Self {
        Error::NotFound { kind: "document", id: doc_id.to_string() }
    }

    /// True for failures of the persistence layer, as opposed to caller errors.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Io(_) | Error::Codec(_) | Error::Meta(_) | Error::Corrupt(_)
        )
    }
}

impl From<TransactionError<Error>> for Error {
    fn from(err: TransactionError<Error>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => Error::Storage(e),
        }
    }
}
