//! Store layer: abstract capabilities consumed by the consensus engine and
//! the leveling scheduler, plus their sqlx/SQLite implementations.
//!
//! The traits exist so the engine and scheduler can be exercised against
//! in-memory fakes in unit tests; production code always wires the Sqlite
//! implementations from this module.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use roadwatch_common::models::{
    AccuracyRow, Case, CaseHeader, CaseSummary, NewCase, RatingStatus, Specialist, TierTally,
    ViolationNotice,
};
use roadwatch_common::{Error, Result};

mod cases;
mod specialists;

pub use cases::SqliteCaseStore;
pub use specialists::SqliteSpecialistStore;

/// Durable record of cases and their ratings.
pub trait CaseStore: Send + Sync {
    /// Working level, solved flag and current-tier rating count for a case.
    fn case_header(&self, case_id: i64) -> impl Future<Output = Result<CaseHeader>> + Send;

    /// Conditionally insert a rating and return its id.
    ///
    /// The insert only lands while the case is unsolved, still at
    /// `expected_level`, and the tier holds fewer than `quorum` ratings;
    /// otherwise it fails with `AlreadyClosed`. A second rating from the
    /// same specialist fails with `DuplicateRating` via the storage-level
    /// uniqueness constraint.
    fn insert_rating(
        &self,
        case_id: i64,
        specialist_id: i64,
        choice: bool,
        expected_level: i64,
        quorum: i64,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Vote tally for one (case, tier) pair.
    fn tier_tally(&self, case_id: i64, tier: i64) -> impl Future<Output = Result<TierTally>> + Send;

    /// Flip `is_solved` false→true and record the verdict.
    ///
    /// Returns whether this call won the transition; a `false` return means
    /// a concurrent submitter already finalized the case.
    fn mark_solved(&self, case_id: i64, verdict: bool)
        -> impl Future<Output = Result<bool>> + Send;

    /// Bump the working level by one, guarded on the level it escalates from.
    ///
    /// Returns whether this call won the transition.
    fn escalate(&self, case_id: i64, from_level: i64)
        -> impl Future<Output = Result<bool>> + Send;

    /// Mark every rating at the resolving tier Correct/Incorrect against the
    /// verdict and fold the outcomes into the raters' streak counters.
    fn grade_tier(
        &self,
        case_id: i64,
        tier: i64,
        verdict: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Data needed to deliver the violation notice for a finalized case.
    fn notice_data(&self, case_id: i64) -> impl Future<Output = Result<ViolationNotice>> + Send;

    /// Unsolved cases at `level` the specialist has not rated yet.
    fn open_cases_for(
        &self,
        specialist_id: i64,
        level: i64,
    ) -> impl Future<Output = Result<Vec<Case>>> + Send;

    /// Case fields plus the per-tier rating breakdown (audit view).
    fn case_summary(&self, case_id: i64) -> impl Future<Output = Result<CaseSummary>> + Send;

    /// Management override of a single rating's resolution status.
    fn set_rating_status(
        &self,
        rating_id: i64,
        status: RatingStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Register a new case; `working_level` starts at `assigned_level`.
    fn create_case(&self, new_case: &NewCase) -> impl Future<Output = Result<i64>> + Send;
}

/// Durable record of specialists.
pub trait SpecialistStore: Send + Sync {
    fn specialist_by_id(&self, id: i64) -> impl Future<Output = Result<Specialist>> + Send;

    /// Register a new specialist at level 1, unverified.
    fn create_specialist(&self, full_name: &str) -> impl Future<Output = Result<i64>> + Send;

    /// External verification event; gates eligibility to rate.
    fn set_verified(&self, id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Windowed accuracy ranking over resolved ratings.
    ///
    /// Only specialists with at least `min_resolved` Correct/Incorrect
    /// ratings inside `[window_start, window_end)` appear; rows are ordered
    /// by score descending, ties broken by correct count descending.
    fn accuracy_ranking(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        min_resolved: i64,
    ) -> impl Future<Output = Result<Vec<AccuracyRow>>> + Send;

    /// Apply all promotions then all demotions as two batched updates in one
    /// transaction. A batch whose affected-row count does not match its
    /// candidate set fails the whole call.
    fn shift_levels(
        &self,
        promote: &[i64],
        demote: &[i64],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Bound a store operation by the configured storage response timeout.
///
/// On expiry the operation fails with `Timeout`; effects are assumed not
/// applied beyond what the storage transaction itself guarantees.
pub async fn with_deadline<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout),
    }
}
