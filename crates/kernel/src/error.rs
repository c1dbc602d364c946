use thiserror::Error;

/// Typed outcomes of lending and catalog operations.
///
/// Every variant is surfaced to the request layer as a distinct error so it
/// can map each one to a precise response; none of them are collapsed into a
/// generic failure.
#[derive(Error, Debug)]
pub enum LendingError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("you can have up to {limit} outstanding reservations; complete or cancel one first")]
    LimitExceeded { limit: u32 },
    #[error("{0}")]
    Validation(String),
    #[error("not authenticated")]
    Unauthorized,
    #[error("ledger failure: {0}")]
    Store(String),
}

pub type LendingResult<T> = Result<T, LendingError>;
