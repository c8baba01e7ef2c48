//! Errors of the library.
use thiserror::Error;

/// Errors of the library.
#[derive(Debug, Error)]
pub enum FrontierError {
    /// The given key does not exist in a record.
    #[error("Key {0} was not found in the record")]
    RecordKeyError(String),

    /// A record value has a type other than the requested one.
    #[error("Record value is not of type {0}")]
    RecordValueTypeError(String),
}
