//! Consensus engine
//!
//! Accepts one rating at a time, enforces eligibility and detects quorum
//! completion. A case resolves when all `k` ratings at its current tier
//! agree; a split vote escalates it one tier instead. The quorum-completion
//! transitions are conditional storage updates checked by affected-row
//! count, so each fires for exactly one of the concurrent submitters.

use std::time::Duration;

use roadwatch_common::models::{Case, CaseSummary, RatingStatus};
use roadwatch_common::{Error, Result};
use tracing::{debug, info};

use crate::notify::Notifier;
use crate::store::{with_deadline, CaseStore, SpecialistStore};

pub struct ConsensusEngine<C, S, N> {
    cases: C,
    specialists: S,
    notifier: N,
    /// Quorum size `k`
    quorum_size: i64,
    storage_timeout: Duration,
}

impl<C, S, N> ConsensusEngine<C, S, N>
where
    C: CaseStore,
    S: SpecialistStore,
    N: Notifier,
{
    pub fn new(
        cases: C,
        specialists: S,
        notifier: N,
        quorum_size: i64,
        storage_timeout: Duration,
    ) -> Self {
        ConsensusEngine {
            cases,
            specialists,
            notifier,
            quorum_size,
            storage_timeout,
        }
    }

    /// Submit one yes/no rating; returns the created rating's id.
    ///
    /// The return value does not reveal whether this submission closed the
    /// case; that is a query concern, see [`case_summary`](Self::case_summary).
    pub async fn submit_rating(
        &self,
        specialist_id: i64,
        case_id: i64,
        choice: bool,
    ) -> Result<i64> {
        let specialist = with_deadline(
            self.storage_timeout,
            self.specialists.specialist_by_id(specialist_id),
        )
        .await?;
        if !specialist.is_verified {
            return Err(Error::Unverified);
        }

        let header =
            with_deadline(self.storage_timeout, self.cases.case_header(case_id)).await?;
        if header.working_level != specialist.level {
            return Err(Error::LevelMismatch);
        }
        if header.is_solved || header.tier_count >= self.quorum_size {
            return Err(Error::AlreadyClosed);
        }

        // The insert re-checks the preconditions atomically; a race between
        // the reads above and this write resolves to AlreadyClosed or
        // DuplicateRating instead of an over-full tier.
        let rating_id = with_deadline(
            self.storage_timeout,
            self.cases.insert_rating(
                case_id,
                specialist_id,
                choice,
                specialist.level,
                self.quorum_size,
            ),
        )
        .await?;

        info!(rating_id, case_id, specialist_id, choice, "rating recorded");

        self.settle_quorum(case_id, specialist.level).await?;

        Ok(rating_id)
    }

    /// Check whether the tier just filled its quorum and apply the outcome.
    async fn settle_quorum(&self, case_id: i64, tier: i64) -> Result<()> {
        let tally =
            with_deadline(self.storage_timeout, self.cases.tier_tally(case_id, tier)).await?;
        if tally.total < self.quorum_size {
            return Ok(());
        }

        let unanimous = tally.yes == self.quorum_size || tally.yes == 0;
        if !unanimous {
            let won = with_deadline(
                self.storage_timeout,
                self.cases.escalate(case_id, tier),
            )
            .await?;
            if won {
                info!(case_id, from_tier = tier, "split quorum, case escalated one tier");
            } else {
                debug!(case_id, "escalation already applied by a concurrent submission");
            }
            return Ok(());
        }

        let verdict = tally.yes == self.quorum_size;
        let won = with_deadline(
            self.storage_timeout,
            self.cases.mark_solved(case_id, verdict),
        )
        .await?;
        if !won {
            debug!(case_id, "quorum already settled by a concurrent submission");
            return Ok(());
        }

        with_deadline(
            self.storage_timeout,
            self.cases.grade_tier(case_id, tier, verdict),
        )
        .await?;
        info!(case_id, verdict, "case resolved by unanimous quorum");

        if verdict {
            let notice =
                with_deadline(self.storage_timeout, self.cases.notice_data(case_id)).await?;
            // A delivery failure surfaces to this caller; the solved state
            // is already durable and is not reverted.
            self.notifier.send(&notice).await?;
        }

        Ok(())
    }

    /// Unsolved cases at the specialist's level they have not rated yet.
    pub async fn open_cases_for(&self, specialist_id: i64) -> Result<Vec<Case>> {
        let specialist = with_deadline(
            self.storage_timeout,
            self.specialists.specialist_by_id(specialist_id),
        )
        .await?;
        if !specialist.is_verified {
            return Err(Error::Unverified);
        }

        with_deadline(
            self.storage_timeout,
            self.cases.open_cases_for(specialist_id, specialist.level),
        )
        .await
    }

    /// Audit view of one case: fields plus per-tier rating breakdown.
    pub async fn case_summary(&self, case_id: i64) -> Result<CaseSummary> {
        with_deadline(self.storage_timeout, self.cases.case_summary(case_id)).await
    }

    /// Management override of a rating's resolution status, used to correct
    /// a verdict after review. Overrides feed the same accuracy ranking the
    /// leveling scheduler consumes.
    pub async fn override_rating_status(
        &self,
        rating_id: i64,
        status: RatingStatus,
    ) -> Result<()> {
        with_deadline(
            self.storage_timeout,
            self.cases.set_rating_status(rating_id, status),
        )
        .await?;
        info!(rating_id, status = status.as_str(), "rating status overridden");
        Ok(())
    }
}
