use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The storage engine could not be opened at all.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// An insert-as-new targeted a key that already exists.
    #[error("key collision: {0}")]
    KeyCollision(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Engine-level failure in the middle of an operation.
    #[error("storage error: {0}")]
    Transient(String),

    /// The operation did not complete in time. Whether a write landed is unknown.
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}
