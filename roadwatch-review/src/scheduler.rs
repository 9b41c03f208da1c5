//! Leveling scheduler
//!
//! Once per reporting period, ranks specialists by windowed review accuracy
//! and shifts the difficulty level of a bounded fraction of the pool: the
//! top tenth (rounded up) moves one level up, and up to the same number move
//! one level down, walking from the bottom of the ranking and skipping
//! anyone already at the level-1 floor or already selected for promotion.
//!
//! `reconcile` is independently callable with explicit window bounds so a
//! test can drive one cycle without a timer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use roadwatch_common::config::Settings;
use roadwatch_common::models::AccuracyRow;
use roadwatch_common::Result;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::store::{with_deadline, SpecialistStore};

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftReport {
    pub eligible: usize,
    pub promoted: usize,
    pub demoted: usize,
}

pub struct LevelingScheduler<S> {
    specialists: S,
    /// Minimum ranking sample `j`
    min_ranking_sample: i64,
    period: chrono::Duration,
    storage_timeout: Duration,
}

impl<S: SpecialistStore> LevelingScheduler<S> {
    pub fn new(specialists: S, settings: &Settings) -> Self {
        LevelingScheduler {
            specialists,
            min_ranking_sample: settings.min_ranking_sample,
            period: chrono::Duration::days(settings.reporting_period_days),
            storage_timeout: settings.storage_timeout(),
        }
    }

    /// Run one reconciliation cycle over an explicit window.
    pub async fn reconcile(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<ShiftReport> {
        let ranking = with_deadline(
            self.storage_timeout,
            self.specialists
                .accuracy_ranking(window_start, window_end, self.min_ranking_sample),
        )
        .await?;

        let (promote, demote) = select_shifts(&ranking);
        let report = ShiftReport {
            eligible: ranking.len(),
            promoted: promote.len(),
            demoted: demote.len(),
        };

        if promote.is_empty() && demote.is_empty() {
            return Ok(report);
        }

        with_deadline(
            self.storage_timeout,
            self.specialists.shift_levels(&promote, &demote),
        )
        .await?;

        Ok(report)
    }

    /// Timer-driven control loop; runs until the task is dropped.
    ///
    /// One tick per reporting period. A tick elapsing while a
    /// reconciliation is still running is dropped (MissedTickBehavior::Skip);
    /// the loop itself never runs two reconciliations concurrently. Window
    /// bounds advance by one period per tick regardless of outcome, and a
    /// failed tick is logged and left alone until the next one.
    pub async fn run(self) {
        // Validation at startup guarantees a positive period
        let period_std = self.period.to_std().unwrap_or(Duration::from_secs(86400));
        let mut ticker = tokio::time::interval(period_std);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; consume it
        // so the first window gets a full period of ratings.
        ticker.tick().await;

        let mut window_start = Utc::now();
        info!(
            period_days = self.period.num_days(),
            "leveling scheduler started"
        );

        loop {
            ticker.tick().await;
            let window_end = window_start + self.period;

            match self.reconcile(window_start, window_end).await {
                Ok(report) => {
                    info!(
                        eligible = report.eligible,
                        promoted = report.promoted,
                        demoted = report.demoted,
                        "specialist levels reconciled"
                    );
                }
                Err(e) => {
                    error!("level reconciliation failed, skipping tick: {}", e);
                }
            }

            window_start = window_end;
        }
    }
}

/// Pick the promotion and demotion sets from a ranked accuracy list.
///
/// `rows` must already be ordered best-first. Both sets are bounded by
/// ⌈n/10⌉, are disjoint, and never demote a specialist at level 1.
fn select_shifts(rows: &[AccuracyRow]) -> (Vec<i64>, Vec<i64>) {
    let quota = rows.len().div_ceil(10);

    let promote: Vec<i64> = rows
        .iter()
        .take(quota)
        .map(|row| row.specialist_id)
        .collect();

    let mut demote = Vec::with_capacity(quota);
    for row in rows.iter().rev() {
        if demote.len() == quota {
            break;
        }
        if row.level <= 1 {
            continue;
        }
        if promote.contains(&row.specialist_id) {
            continue;
        }
        demote.push(row.specialist_id);
    }

    (promote, demote)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(specialist_id: i64, level: i64, correct: i64, resolved: i64) -> AccuracyRow {
        AccuracyRow {
            specialist_id,
            level,
            correct,
            resolved,
        }
    }

    #[test]
    fn empty_ranking_shifts_nobody() {
        let (promote, demote) = select_shifts(&[]);
        assert!(promote.is_empty());
        assert!(demote.is_empty());
    }

    #[test]
    fn single_specialist_is_promoted_not_demoted() {
        let rows = vec![row(1, 1, 8, 10)];
        let (promote, demote) = select_shifts(&rows);
        assert_eq!(promote, vec![1]);
        assert!(demote.is_empty(), "sets must stay disjoint");
    }

    #[test]
    fn quota_is_ceiling_of_tenth() {
        let rows: Vec<AccuracyRow> = (1..=11).map(|id| row(id, 2, 5, 10)).collect();
        let (promote, demote) = select_shifts(&rows);
        assert_eq!(promote.len(), 2); // ceil(11 / 10)
        assert_eq!(demote.len(), 2);
        assert_eq!(promote, vec![1, 2]);
        assert_eq!(demote, vec![11, 10]);
    }

    #[test]
    fn level_one_specialists_are_skipped_on_demotion() {
        let mut rows: Vec<AccuracyRow> = (1..=10).map(|id| row(id, 2, 5, 10)).collect();
        rows[9].level = 1; // worst performer sits at the floor
        let (promote, demote) = select_shifts(&rows);
        assert_eq!(promote, vec![1]);
        assert_eq!(demote, vec![9], "demotion walks past the floor specialist");
    }

    #[test]
    fn demotion_walk_skips_promoted_specialists() {
        // Two eligible specialists, quota 1: the bottom one is at the floor,
        // the walk reaches the promoted top one and must skip it.
        let rows = vec![row(1, 2, 9, 10), row(2, 1, 2, 10)];
        let (promote, demote) = select_shifts(&rows);
        assert_eq!(promote, vec![1]);
        assert!(demote.is_empty());
    }

    #[test]
    fn all_floor_pool_has_no_demotions() {
        let rows: Vec<AccuracyRow> = (1..=10).map(|id| row(id, 1, 5, 10)).collect();
        let (promote, demote) = select_shifts(&rows);
        assert_eq!(promote, vec![1]);
        assert!(demote.is_empty());
    }
}
