//! Data models shared between the store layer, the consensus engine and the
//! leveling scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolution state of a single rating.
///
/// A rating stays `Unknown` until a quorum resolves at the tier it was
/// submitted for. Ratings from a tier abandoned by escalation remain
/// `Unknown` forever and never count toward a specialist's accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingStatus {
    Unknown,
    Correct,
    Incorrect,
}

impl RatingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingStatus::Unknown => "Unknown",
            RatingStatus::Correct => "Correct",
            RatingStatus::Incorrect => "Incorrect",
        }
    }

    pub fn parse(raw: &str) -> Option<RatingStatus> {
        match raw {
            "Unknown" => Some(RatingStatus::Unknown),
            "Correct" => Some(RatingStatus::Correct),
            "Incorrect" => Some(RatingStatus::Incorrect),
            _ => None,
        }
    }
}

/// A camera-sourced traffic-violation record under crowd review.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Case {
    pub id: i64,
    pub camera_id: String,
    /// Vehicle registration plate; keys into the contacts table
    pub transport: String,
    pub violation_id: String,
    pub violation_value: String,
    /// Difficulty tier fixed at creation
    pub assigned_level: i64,
    /// Tier currently under review; rises by one on each disagreement
    pub working_level: i64,
    pub occurred_at: DateTime<Utc>,
    pub photo_url: String,
    pub is_solved: bool,
    /// Set on resolution: true = confirmed valid violation
    pub verdict: Option<bool>,
}

/// Fields needed to register a new case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCase {
    pub camera_id: String,
    pub transport: String,
    pub violation_id: String,
    pub violation_value: String,
    pub assigned_level: i64,
    pub occurred_at: DateTime<Utc>,
    pub photo_url: String,
}

/// The slice of a case the consensus engine checks before accepting a rating.
#[derive(Debug, Clone, Copy)]
pub struct CaseHeader {
    pub working_level: i64,
    pub is_solved: bool,
    /// Ratings already recorded at the current working level
    pub tier_count: i64,
}

/// Vote tally for one (case, tier) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTally {
    /// Ratings recorded at the tier
    pub total: i64,
    /// Of those, ratings with choice = true
    pub yes: i64,
}

/// Per-tier rating counts for the audit view of a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub tier: i64,
    pub total: i64,
    pub correct: i64,
    pub incorrect: i64,
    pub unknown: i64,
}

/// Case fields plus the rating history, grouped by tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    #[serde(flatten)]
    pub case: Case,
    pub tiers: Vec<TierBreakdown>,
}

/// A crowd reviewer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Specialist {
    pub id: i64,
    pub full_name: String,
    /// Difficulty tier; only the leveling scheduler changes this
    pub level: i64,
    pub current_streak: i64,
    pub best_streak: i64,
    pub is_verified: bool,
}

/// One row of the windowed accuracy ranking the scheduler reconciles from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyRow {
    pub specialist_id: i64,
    pub level: i64,
    /// Ratings resolved Correct inside the window
    pub correct: i64,
    /// Ratings resolved either way inside the window
    pub resolved: i64,
}

impl AccuracyRow {
    /// Fraction of resolved ratings that were correct.
    pub fn score(&self) -> f64 {
        if self.resolved == 0 {
            0.0
        } else {
            self.correct as f64 / self.resolved as f64
        }
    }
}

/// Everything the notifier needs to deliver a violation notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationNotice {
    pub email: String,
    pub violation_kind: String,
    pub violation_value: String,
    pub amount: i64,
    pub coordinates: String,
    pub photo_url: String,
    pub occurred_at: DateTime<Utc>,
}
