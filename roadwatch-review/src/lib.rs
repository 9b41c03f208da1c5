//! roadwatch-review library - review consensus and specialist leveling
//!
//! Hosts the two core components of the Roadwatch backend:
//! - the consensus engine, which accepts rating submissions and finalizes
//!   or escalates cases,
//! - the leveling scheduler, which periodically re-ranks specialists by
//!   accuracy and shifts their difficulty level.

use std::sync::Arc;

pub mod api;
pub mod engine;
pub mod notify;
pub mod scheduler;
pub mod store;

use engine::ConsensusEngine;
use notify::WebhookNotifier;
use store::{SqliteCaseStore, SqliteSpecialistStore};

/// The production engine wiring: sqlx stores plus the webhook notifier.
pub type ReviewEngine =
    ConsensusEngine<SqliteCaseStore, SqliteSpecialistStore, WebhookNotifier>;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReviewEngine>,
}

impl AppState {
    pub fn new(engine: ReviewEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
