//! End-to-end consensus tests over a real SQLite database

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use roadwatch_common::db::init_database;
use roadwatch_common::models::{NewCase, RatingStatus, ViolationNotice};
use roadwatch_common::{Error, Result};
use roadwatch_review::engine::ConsensusEngine;
use roadwatch_review::notify::Notifier;
use roadwatch_review::store::{CaseStore, SpecialistStore, SqliteCaseStore, SqliteSpecialistStore};
use sqlx::SqlitePool;

/// Counts deliveries so tests can assert the notifier fired exactly once.
#[derive(Clone, Default)]
struct RecordingNotifier {
    deliveries: Arc<AtomicUsize>,
}

impl Notifier for RecordingNotifier {
    async fn send(&self, _notice: &ViolationNotice) -> Result<()> {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type TestEngine = ConsensusEngine<SqliteCaseStore, SqliteSpecialistStore, RecordingNotifier>;

struct Harness {
    pool: SqlitePool,
    engine: Arc<TestEngine>,
    notifier: RecordingNotifier,
    cases: SqliteCaseStore,
    specialists: SqliteSpecialistStore,
    _dir: tempfile::TempDir,
}

async fn setup(quorum_size: i64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("review.db")).await.unwrap();

    // Reference data joined in for violation notices
    sqlx::query("INSERT INTO violations (id, kind, amount) VALUES ('v-speed', 'speeding', 5000)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO contacts (transport, email) VALUES ('A001AA', 'owner@example.com')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO cameras (id, coordinates) VALUES ('cam-1', '55.75,37.61')")
        .execute(&pool)
        .await
        .unwrap();

    let cases = SqliteCaseStore::new(pool.clone());
    let specialists = SqliteSpecialistStore::new(pool.clone());
    let notifier = RecordingNotifier::default();
    let engine = ConsensusEngine::new(
        cases.clone(),
        specialists.clone(),
        notifier.clone(),
        quorum_size,
        Duration::from_secs(5),
    );

    Harness {
        pool,
        engine: Arc::new(engine),
        notifier,
        cases,
        specialists,
        _dir: dir,
    }
}

impl Harness {
    async fn new_specialist(&self, name: &str, level: i64, verified: bool) -> i64 {
        let id = self.specialists.create_specialist(name).await.unwrap();
        if verified {
            self.specialists.set_verified(id).await.unwrap();
        }
        if level != 1 {
            sqlx::query("UPDATE specialists SET level = ? WHERE id = ?")
                .bind(level)
                .bind(id)
                .execute(&self.pool)
                .await
                .unwrap();
        }
        id
    }

    async fn new_case(&self, assigned_level: i64) -> i64 {
        self.cases
            .create_case(&NewCase {
                camera_id: "cam-1".to_string(),
                transport: "A001AA".to_string(),
                violation_id: "v-speed".to_string(),
                violation_value: "97 km/h in a 60 zone".to_string(),
                assigned_level,
                occurred_at: Utc::now(),
                photo_url: "/photos/1.jpg".to_string(),
            })
            .await
            .unwrap()
    }

    async fn case_row(&self, case_id: i64) -> (bool, Option<bool>, i64) {
        let row: (bool, Option<bool>, i64) =
            sqlx::query_as("SELECT is_solved, verdict, working_level FROM cases WHERE id = ?")
                .bind(case_id)
                .fetch_one(&self.pool)
                .await
                .unwrap();
        row
    }

    async fn statuses_at_tier(&self, case_id: i64, tier: i64) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT status FROM ratings WHERE case_id = ? AND tier = ? ORDER BY id",
        )
        .bind(case_id)
        .bind(tier)
        .fetch_all(&self.pool)
        .await
        .unwrap()
    }

    async fn streaks(&self, specialist_id: i64) -> (i64, i64) {
        sqlx::query_as("SELECT current_streak, best_streak FROM specialists WHERE id = ?")
            .bind(specialist_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn unanimous_true_resolves_valid_and_notifies() {
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    let mut rating_ids = Vec::new();
    for name in ["A", "B", "C"] {
        let spec = h.new_specialist(name, 1, true).await;
        rating_ids.push(h.engine.submit_rating(spec, case_id, true).await.unwrap());
    }

    let (is_solved, verdict, working_level) = h.case_row(case_id).await;
    assert!(is_solved);
    assert_eq!(verdict, Some(true));
    assert_eq!(working_level, 1);
    assert_eq!(h.statuses_at_tier(case_id, 1).await, vec!["Correct"; 3]);
    assert_eq!(h.notifier.deliveries.load(Ordering::SeqCst), 1);
    assert_eq!(rating_ids.len(), 3);
}

#[tokio::test]
async fn unanimous_false_resolves_invalid_without_notice() {
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    for name in ["A", "B", "C"] {
        let spec = h.new_specialist(name, 1, true).await;
        h.engine.submit_rating(spec, case_id, false).await.unwrap();
    }

    let (is_solved, verdict, _) = h.case_row(case_id).await;
    assert!(is_solved);
    assert_eq!(verdict, Some(false));
    // Unanimous rejection still grades everyone Correct
    assert_eq!(h.statuses_at_tier(case_id, 1).await, vec!["Correct"; 3]);
    assert_eq!(h.notifier.deliveries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn mixed_quorum_escalates_one_tier() {
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    let a = h.new_specialist("A", 1, true).await;
    let b = h.new_specialist("B", 1, true).await;
    let c = h.new_specialist("C", 1, true).await;

    h.engine.submit_rating(a, case_id, true).await.unwrap();
    h.engine.submit_rating(b, case_id, true).await.unwrap();
    h.engine.submit_rating(c, case_id, false).await.unwrap();

    let (is_solved, verdict, working_level) = h.case_row(case_id).await;
    assert!(!is_solved);
    assert_eq!(verdict, None);
    assert_eq!(working_level, 2);
    assert_eq!(h.statuses_at_tier(case_id, 1).await, vec!["Unknown"; 3]);

    // Level-1 reviewers no longer match the escalated case
    let d = h.new_specialist("D", 1, true).await;
    let err = h.engine.submit_rating(d, case_id, true).await.unwrap_err();
    assert!(matches!(err, Error::LevelMismatch));
}

#[tokio::test]
async fn escalated_case_resolves_at_new_tier_leaving_old_votes_unknown() {
    // The worked example: A, B vote true and C false at tier 1; the case
    // escalates, then D, E, F resolve it unanimously at tier 2.
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    for (name, choice) in [("A", true), ("B", true), ("C", false)] {
        let spec = h.new_specialist(name, 1, true).await;
        h.engine.submit_rating(spec, case_id, choice).await.unwrap();
    }

    for name in ["D", "E", "F"] {
        let spec = h.new_specialist(name, 2, true).await;
        h.engine.submit_rating(spec, case_id, true).await.unwrap();
    }

    let (is_solved, verdict, working_level) = h.case_row(case_id).await;
    assert!(is_solved);
    assert_eq!(verdict, Some(true));
    assert_eq!(working_level, 2);
    assert_eq!(h.statuses_at_tier(case_id, 1).await, vec!["Unknown"; 3]);
    assert_eq!(h.statuses_at_tier(case_id, 2).await, vec!["Correct"; 3]);
    assert_eq!(h.notifier.deliveries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_submission_is_rejected() {
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    let spec = h.new_specialist("A", 1, true).await;

    h.engine.submit_rating(spec, case_id, true).await.unwrap();
    let err = h.engine.submit_rating(spec, case_id, false).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateRating));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ratings WHERE case_id = ?")
        .bind(case_id)
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn concurrent_duplicate_submissions_accept_exactly_one() {
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    let spec = h.new_specialist("A", 1, true).await;

    let first = tokio::spawn({
        let engine = h.engine.clone();
        async move { engine.submit_rating(spec, case_id, true).await }
    });
    let second = tokio::spawn({
        let engine = h.engine.clone();
        async move { engine.submit_rating(spec, case_id, true).await }
    });

    let results = [first.await.unwrap(), second.await.unwrap()];
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1, "exactly one of the racing duplicates may land");
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(Error::DuplicateRating) | Err(Error::AlreadyClosed))));
}

#[tokio::test]
async fn concurrent_quorum_completion_fires_follow_ups_once() {
    // Two distinct specialists race for the last two quorum slots; whichever
    // interleaving wins, the solved transition and its follow-ups (grading,
    // notice delivery) must happen exactly once.
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    let a = h.new_specialist("A", 1, true).await;
    let b = h.new_specialist("B", 1, true).await;
    let c = h.new_specialist("C", 1, true).await;

    h.engine.submit_rating(a, case_id, true).await.unwrap();

    let second = tokio::spawn({
        let engine = h.engine.clone();
        async move { engine.submit_rating(b, case_id, true).await }
    });
    let third = tokio::spawn({
        let engine = h.engine.clone();
        async move { engine.submit_rating(c, case_id, true).await }
    });
    second.await.unwrap().unwrap();
    third.await.unwrap().unwrap();

    let (is_solved, verdict, _) = h.case_row(case_id).await;
    assert!(is_solved);
    assert_eq!(verdict, Some(true));
    assert_eq!(h.statuses_at_tier(case_id, 1).await, vec!["Correct"; 3]);
    assert_eq!(
        h.notifier.deliveries.load(Ordering::SeqCst),
        1,
        "exactly one racing submitter owns the follow-ups"
    );
}

#[tokio::test]
async fn unverified_specialist_is_rejected_without_a_rating_row() {
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    let spec = h.new_specialist("A", 1, false).await;

    let err = h.engine.submit_rating(spec, case_id, true).await.unwrap_err();
    assert!(matches!(err, Error::Unverified));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ratings")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn solved_case_rejects_further_ratings() {
    let h = setup(2).await;
    let case_id = h.new_case(1).await;
    for name in ["A", "B"] {
        let spec = h.new_specialist(name, 1, true).await;
        h.engine.submit_rating(spec, case_id, true).await.unwrap();
    }

    let late = h.new_specialist("C", 1, true).await;
    let err = h.engine.submit_rating(late, case_id, true).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyClosed));
}

#[tokio::test]
async fn missing_specialist_and_case_are_distinct_errors() {
    let h = setup(3).await;
    let err = h.engine.submit_rating(999, 1, true).await.unwrap_err();
    assert!(matches!(err, Error::SpecialistNotFound));

    let spec = h.new_specialist("A", 1, true).await;
    let err = h.engine.submit_rating(spec, 999, true).await.unwrap_err();
    assert!(matches!(err, Error::CaseNotFound));
}

#[tokio::test]
async fn correct_outcomes_grow_streaks() {
    let h = setup(2).await;
    let a = h.new_specialist("A", 1, true).await;
    let b = h.new_specialist("B", 1, true).await;

    for _ in 0..2 {
        let case_id = h.new_case(1).await;
        h.engine.submit_rating(a, case_id, true).await.unwrap();
        h.engine.submit_rating(b, case_id, true).await.unwrap();
    }

    assert_eq!(h.streaks(a).await, (2, 2));
    assert_eq!(h.streaks(b).await, (2, 2));
}

#[tokio::test]
async fn incorrect_grade_resets_current_streak_but_keeps_best() {
    // Exercised at the store level: grade a handcrafted split tier so the
    // disagreeing rating lands Incorrect.
    let h = setup(3).await;
    let a = h.new_specialist("A", 1, true).await;
    let b = h.new_specialist("B", 1, true).await;

    // Two unanimous rounds first so A carries a streak
    for _ in 0..2 {
        let case_id = h.new_case(1).await;
        h.engine.submit_rating(a, case_id, true).await.unwrap();
        let c1 = h.new_specialist(&format!("X{}", case_id), 1, true).await;
        let c2 = h.new_specialist(&format!("Y{}", case_id), 1, true).await;
        h.engine.submit_rating(c1, case_id, true).await.unwrap();
        h.engine.submit_rating(c2, case_id, true).await.unwrap();
    }
    assert_eq!(h.streaks(a).await, (2, 2));

    let case_id = h.new_case(1).await;
    sqlx::query(
        "INSERT INTO ratings (case_id, specialist_id, choice, tier, submitted_at)
         VALUES (?, ?, 0, 1, ?), (?, ?, 1, 1, ?)",
    )
    .bind(case_id)
    .bind(a)
    .bind(Utc::now().to_rfc3339())
    .bind(case_id)
    .bind(b)
    .bind(Utc::now().to_rfc3339())
    .execute(&h.pool)
    .await
    .unwrap();

    h.cases.grade_tier(case_id, 1, true).await.unwrap();

    assert_eq!(h.streaks(a).await, (0, 2), "reset keeps the historical best");
    assert_eq!(h.streaks(b).await, (1, 1));
}

#[tokio::test]
async fn open_case_feed_hides_rated_and_foreign_level_cases() {
    let h = setup(3).await;
    let spec = h.new_specialist("A", 1, true).await;
    let rated = h.new_case(1).await;
    let fresh = h.new_case(1).await;
    let harder = h.new_case(2).await;

    h.engine.submit_rating(spec, rated, true).await.unwrap();

    let open = h.engine.open_cases_for(spec).await.unwrap();
    let ids: Vec<i64> = open.iter().map(|c| c.id).collect();
    assert!(ids.contains(&fresh));
    assert!(!ids.contains(&rated), "already-rated case must not reappear");
    assert!(!ids.contains(&harder), "higher-tier case is not visible at level 1");
}

#[tokio::test]
async fn case_summary_breaks_ratings_down_by_tier() {
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    for (name, choice) in [("A", true), ("B", true), ("C", false)] {
        let spec = h.new_specialist(name, 1, true).await;
        h.engine.submit_rating(spec, case_id, choice).await.unwrap();
    }
    let d = h.new_specialist("D", 2, true).await;
    h.engine.submit_rating(d, case_id, true).await.unwrap();

    let summary = h.engine.case_summary(case_id).await.unwrap();
    assert_eq!(summary.case.working_level, 2);
    assert_eq!(summary.tiers.len(), 2);
    assert_eq!(summary.tiers[0].tier, 1);
    assert_eq!(summary.tiers[0].total, 3);
    assert_eq!(summary.tiers[0].unknown, 3);
    assert_eq!(summary.tiers[1].tier, 2);
    assert_eq!(summary.tiers[1].total, 1);
}

#[tokio::test]
async fn status_override_is_persisted() {
    let h = setup(3).await;
    let case_id = h.new_case(1).await;
    let spec = h.new_specialist("A", 1, true).await;
    let rating_id = h.engine.submit_rating(spec, case_id, true).await.unwrap();

    h.engine
        .override_rating_status(rating_id, RatingStatus::Incorrect)
        .await
        .unwrap();

    let status: String = sqlx::query_scalar("SELECT status FROM ratings WHERE id = ?")
        .bind(rating_id)
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(status, "Incorrect");

    let err = h
        .engine
        .override_rating_status(9999, RatingStatus::Correct)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RatingNotFound));
}
