use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Protocol-shape violations surfaced to the caller. Runtime conditions a
/// client can act on (precondition failure, missing privilege) are reported
/// as [`crate::ApplyOutcome`] values instead, one per submitted entry.
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),
}
