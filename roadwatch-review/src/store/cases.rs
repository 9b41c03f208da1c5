//! Case and rating queries over SQLite
//!
//! The quorum-sensitive statements here are written as single conditional
//! statements whose affected-row counts decide the outcome, so that the
//! count-and-compare transitions of the consensus engine fire exactly once
//! under concurrent submissions.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use roadwatch_common::models::{
    Case, CaseHeader, CaseSummary, NewCase, TierBreakdown, TierTally, ViolationNotice,
};
use roadwatch_common::{Error, Result};

use super::CaseStore;

const CASE_COLUMNS: &str = "id, camera_id, transport, violation_id, violation_value, \
     assigned_level, working_level, occurred_at, photo_url, is_solved, verdict";

/// sqlx-backed implementation of [`CaseStore`].
#[derive(Clone)]
pub struct SqliteCaseStore {
    pool: SqlitePool,
}

impl SqliteCaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteCaseStore { pool }
    }
}

impl CaseStore for SqliteCaseStore {
    async fn case_header(&self, case_id: i64) -> Result<CaseHeader> {
        let row = sqlx::query(
            r#"
            SELECT c.working_level, c.is_solved,
                   (SELECT COUNT(*) FROM ratings r
                    WHERE r.case_id = c.id AND r.tier = c.working_level) AS tier_count
            FROM cases c
            WHERE c.id = ?
            "#,
        )
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::CaseNotFound)?;

        Ok(CaseHeader {
            working_level: row.get("working_level"),
            is_solved: row.get("is_solved"),
            tier_count: row.get("tier_count"),
        })
    }

    async fn insert_rating(
        &self,
        case_id: i64,
        specialist_id: i64,
        choice: bool,
        expected_level: i64,
        quorum: i64,
    ) -> Result<i64> {
        // INSERT ... SELECT is one atomic statement: the row only lands if
        // the case is still open at the expected tier with quorum room left,
        // so at most `quorum` ratings ever exist per tier even when the
        // engine's pre-checks raced a concurrent submission.
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO ratings (case_id, specialist_id, choice, tier, submitted_at)
            SELECT c.id, ?, ?, c.working_level, ?
            FROM cases c
            WHERE c.id = ? AND c.is_solved = 0 AND c.working_level = ?
              AND (SELECT COUNT(*) FROM ratings r
                   WHERE r.case_id = c.id AND r.tier = c.working_level) < ?
            RETURNING id
            "#,
        )
        .bind(specialist_id)
        .bind(choice)
        .bind(Utc::now().to_rfc3339())
        .bind(case_id)
        .bind(expected_level)
        .bind(quorum)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => Error::DuplicateRating,
            _ => Error::Storage(e),
        })?;

        inserted.ok_or(Error::AlreadyClosed)
    }

    async fn tier_tally(&self, case_id: i64, tier: i64) -> Result<TierTally> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(choice), 0) AS yes
             FROM ratings WHERE case_id = ? AND tier = ?",
        )
        .bind(case_id)
        .bind(tier)
        .fetch_one(&self.pool)
        .await?;

        Ok(TierTally {
            total: row.get("total"),
            yes: row.get("yes"),
        })
    }

    async fn mark_solved(&self, case_id: i64, verdict: bool) -> Result<bool> {
        // Guarded on is_solved = 0: exactly one of the concurrent quorum
        // completers sees rows_affected = 1 and owns the follow-ups.
        let result = sqlx::query(
            "UPDATE cases SET is_solved = 1, verdict = ? WHERE id = ? AND is_solved = 0",
        )
        .bind(verdict)
        .bind(case_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn escalate(&self, case_id: i64, from_level: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE cases SET working_level = working_level + 1
             WHERE id = ? AND is_solved = 0 AND working_level = ?",
        )
        .bind(case_id)
        .bind(from_level)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn grade_tier(&self, case_id: i64, tier: i64, verdict: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE ratings
             SET status = CASE WHEN choice = ? THEN 'Correct' ELSE 'Incorrect' END
             WHERE case_id = ? AND tier = ?",
        )
        .bind(verdict)
        .bind(case_id)
        .bind(tier)
        .execute(&mut *tx)
        .await?;

        // Streaks follow the freshly graded statuses: a Correct outcome
        // extends current_streak (and best_streak when surpassed), an
        // Incorrect one resets current_streak to zero.
        sqlx::query(
            r#"
            UPDATE specialists
            SET current_streak = CASE
                    WHEN r.status = 'Correct' THEN specialists.current_streak + 1
                    ELSE 0
                END,
                best_streak = CASE
                    WHEN r.status = 'Correct'
                         AND specialists.current_streak + 1 > specialists.best_streak
                    THEN specialists.current_streak + 1
                    ELSE specialists.best_streak
                END
            FROM ratings r
            WHERE r.case_id = ? AND r.tier = ? AND r.specialist_id = specialists.id
            "#,
        )
        .bind(case_id)
        .bind(tier)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn notice_data(&self, case_id: i64) -> Result<ViolationNotice> {
        let row = sqlx::query(
            r#"
            SELECT cn.email, v.kind, c.violation_value, v.amount,
                   cm.coordinates, c.photo_url, c.occurred_at
            FROM cases c
            JOIN violations v ON c.violation_id = v.id
            JOIN contacts cn ON c.transport = cn.transport
            JOIN cameras cm ON c.camera_id = cm.id
            WHERE c.id = ?
            "#,
        )
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::CaseNotFound)?;

        Ok(ViolationNotice {
            email: row.get("email"),
            violation_kind: row.get("kind"),
            violation_value: row.get("violation_value"),
            amount: row.get("amount"),
            coordinates: row.get("coordinates"),
            photo_url: row.get("photo_url"),
            occurred_at: row.get("occurred_at"),
        })
    }

    async fn open_cases_for(&self, specialist_id: i64, level: i64) -> Result<Vec<Case>> {
        let cases = sqlx::query_as::<_, Case>(
            r#"
            SELECT c.id, c.camera_id, c.transport, c.violation_id, c.violation_value,
                   c.assigned_level, c.working_level, c.occurred_at, c.photo_url,
                   c.is_solved, c.verdict
            FROM cases c
            LEFT JOIN ratings r ON r.case_id = c.id AND r.specialist_id = ?
            WHERE c.is_solved = 0 AND c.working_level = ? AND r.id IS NULL
            ORDER BY c.id
            LIMIT 50
            "#,
        )
        .bind(specialist_id)
        .bind(level)
        .fetch_all(&self.pool)
        .await?;

        Ok(cases)
    }

    async fn case_summary(&self, case_id: i64) -> Result<CaseSummary> {
        let case = sqlx::query_as::<_, Case>(&format!(
            "SELECT {} FROM cases WHERE id = ?",
            CASE_COLUMNS
        ))
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::CaseNotFound)?;

        let rows = sqlx::query(
            r#"
            SELECT tier,
                   COUNT(*) AS total,
                   COUNT(CASE WHEN status = 'Correct' THEN 1 END) AS correct,
                   COUNT(CASE WHEN status = 'Incorrect' THEN 1 END) AS incorrect,
                   COUNT(CASE WHEN status = 'Unknown' THEN 1 END) AS unknown
            FROM ratings
            WHERE case_id = ?
            GROUP BY tier
            ORDER BY tier
            "#,
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?;

        let tiers = rows
            .into_iter()
            .map(|row| TierBreakdown {
                tier: row.get("tier"),
                total: row.get("total"),
                correct: row.get("correct"),
                incorrect: row.get("incorrect"),
                unknown: row.get("unknown"),
            })
            .collect();

        Ok(CaseSummary { case, tiers })
    }

    async fn set_rating_status(
        &self,
        rating_id: i64,
        status: roadwatch_common::models::RatingStatus,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE ratings SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(rating_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() != 1 {
            return Err(Error::RatingNotFound);
        }
        Ok(())
    }

    async fn create_case(&self, new_case: &NewCase) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO cases (camera_id, transport, violation_id, violation_value,
                               assigned_level, working_level, occurred_at, photo_url)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&new_case.camera_id)
        .bind(&new_case.transport)
        .bind(&new_case.violation_id)
        .bind(&new_case.violation_value)
        .bind(new_case.assigned_level)
        .bind(new_case.assigned_level)
        .bind(new_case.occurred_at.to_rfc3339())
        .bind(&new_case.photo_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}
