//! Common error types for Roadwatch

use thiserror::Error;

/// Common result type for Roadwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across the review services.
///
/// The first four variants are client-responsibility outcomes of a rating
/// submission and are never retryable. `Storage` and `Timeout` may be
/// retried by the caller with the same inputs: the uniqueness constraint on
/// (case, specialist) makes a retried submission fail with
/// `DuplicateRating` instead of double-counting.
#[derive(Error, Debug)]
pub enum Error {
    /// Specialist exists but has not been verified yet
    #[error("specialist is not verified")]
    Unverified,

    /// Specialist's level does not match the case's working level
    #[error("specialist level does not match the case working level")]
    LevelMismatch,

    /// Case is already solved, or its current tier already holds a full quorum
    #[error("case is closed for new ratings")]
    AlreadyClosed,

    /// A rating from this specialist for this case already exists
    #[error("duplicate rating for this (case, specialist) pair")]
    DuplicateRating,

    /// No specialist with the requested id
    #[error("specialist not found")]
    SpecialistNotFound,

    /// No case with the requested id
    #[error("case not found")]
    CaseNotFound,

    /// No rating with the requested id
    #[error("rating not found")]
    RatingNotFound,

    /// Database operation error (wraps sqlx::Error)
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Storage response deadline expired; effects are assumed not applied
    #[error("storage response timeout")]
    Timeout,

    /// Violation notice delivery failed after the case was already finalized
    #[error("notifier error: {0}")]
    Notify(String),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant violation (e.g. a batched update touched an
    /// unexpected number of rows)
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller may retry the same submission verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Timeout)
    }
}
