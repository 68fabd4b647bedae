//! Error kinds surfaced by the index backend and the deref map.
//!
//! No error is recovered locally: every kind propagates to the caller, which
//! decides between retrying the whole operation (`Io`, `Interrupted`) and
//! treating the row as lost (`CorruptEncoding`).

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An index table was expected to exist but does not.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// The storage backend failed. Retrying the whole operation is safe.
    #[error("Index backend i/o failure")]
    Io(#[source] rocksdb::Error),

    /// A decoder hit an unexpected end of stream or a bad terminator.
    /// Fatal for the affected row.
    #[error("Corrupt encoding: {0}")]
    CorruptEncoding(String),

    /// Stored state contradicts a structural invariant (e.g. more than one
    /// forward row for a single dependant). Fatal.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A blocking backend call was cancelled. Persisted state is consistent;
    /// retrying the interrupted operation converges.
    #[error("Operation interrupted")]
    Interrupted,

    /// A value does not fit its field definition (wrong fixed length, missing
    /// field, condition outside the key prefix).
    #[error("Encoding: {0}")]
    Encoding(String),

    /// An identifier failed construction-time validation.
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// The configured storage path is unusable.
    #[error("Invalid store path: {0}")]
    InvalidStorePath(String),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;
        // Interruption-shaped statuses keep their own kind so callers can
        // retry-to-converge without logging a backend failure.
        match e.kind() {
            ErrorKind::Aborted
            | ErrorKind::ShutdownInProgress
            | ErrorKind::TimedOut
            | ErrorKind::TryAgain => Error::Interrupted,
            _ => Error::Io(e),
        }
    }
}
