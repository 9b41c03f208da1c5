//! Specialist queries over SQLite

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use roadwatch_common::models::{AccuracyRow, Specialist};
use roadwatch_common::{Error, Result};

use super::SpecialistStore;

/// sqlx-backed implementation of [`SpecialistStore`].
#[derive(Clone)]
pub struct SqliteSpecialistStore {
    pool: SqlitePool,
}

impl SqliteSpecialistStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteSpecialistStore { pool }
    }
}

impl SpecialistStore for SqliteSpecialistStore {
    async fn specialist_by_id(&self, id: i64) -> Result<Specialist> {
        sqlx::query_as::<_, Specialist>(
            "SELECT id, full_name, level, current_streak, best_streak, is_verified
             FROM specialists WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::SpecialistNotFound)
    }

    async fn create_specialist(&self, full_name: &str) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO specialists (full_name) VALUES (?) RETURNING id",
        )
        .bind(full_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn set_verified(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE specialists SET is_verified = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() != 1 {
            return Err(Error::SpecialistNotFound);
        }
        Ok(())
    }

    async fn accuracy_ranking(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        min_resolved: i64,
    ) -> Result<Vec<AccuracyRow>> {
        // Only resolved ratings count: rows still Unknown (open rounds and
        // tiers abandoned by escalation) appear in neither the numerator nor
        // the denominator of the score.
        let rows = sqlx::query(
            r#"
            SELECT s.id AS specialist_id, s.level,
                   COUNT(CASE WHEN r.status = 'Correct' THEN 1 END) AS correct,
                   COUNT(*) AS resolved
            FROM specialists s
            JOIN ratings r ON r.specialist_id = s.id
            WHERE r.status != 'Unknown'
              AND r.submitted_at >= ? AND r.submitted_at < ?
            GROUP BY s.id, s.level
            HAVING COUNT(*) >= ?
            ORDER BY CAST(COUNT(CASE WHEN r.status = 'Correct' THEN 1 END) AS REAL)
                         / COUNT(*) DESC,
                     COUNT(CASE WHEN r.status = 'Correct' THEN 1 END) DESC
            "#,
        )
        .bind(window_start.to_rfc3339())
        .bind(window_end.to_rfc3339())
        .bind(min_resolved)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AccuracyRow {
                specialist_id: row.get("specialist_id"),
                level: row.get("level"),
                correct: row.get("correct"),
                resolved: row.get("resolved"),
            })
            .collect())
    }

    async fn shift_levels(&self, promote: &[i64], demote: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !promote.is_empty() {
            let sql = format!(
                "UPDATE specialists SET level = level + 1 WHERE id IN ({})",
                placeholders(promote.len())
            );
            let mut query = sqlx::query(&sql);
            for id in promote {
                query = query.bind(id);
            }
            let result = query.execute(&mut *tx).await?;
            if result.rows_affected() != promote.len() as u64 {
                tx.rollback().await?;
                return Err(Error::Internal(format!(
                    "promotion batch touched {} rows, expected {}",
                    result.rows_affected(),
                    promote.len()
                )));
            }
        }

        if !demote.is_empty() {
            let sql = format!(
                "UPDATE specialists SET level = level - 1 WHERE id IN ({})",
                placeholders(demote.len())
            );
            let mut query = sqlx::query(&sql);
            for id in demote {
                query = query.bind(id);
            }
            let result = query.execute(&mut *tx).await?;
            if result.rows_affected() != demote.len() as u64 {
                tx.rollback().await?;
                return Err(Error::Internal(format!(
                    "demotion batch touched {} rows, expected {}",
                    result.rows_affected(),
                    demote.len()
                )));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
