//! roadwatch-review - review consensus and specialist leveling service
//!
//! Wires the sqlx stores, the consensus engine, the leveling scheduler and
//! the HTTP surface together and runs until stopped.

use anyhow::Result;
use roadwatch_common::config::Settings;
use roadwatch_common::db::init_database;
use roadwatch_review::engine::ConsensusEngine;
use roadwatch_review::notify::WebhookNotifier;
use roadwatch_review::scheduler::LevelingScheduler;
use roadwatch_review::store::{SqliteCaseStore, SqliteSpecialistStore};
use roadwatch_review::{api::build_router, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting Roadwatch Review (roadwatch-review) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings = Settings::load()?;
    info!(
        quorum_size = settings.quorum_size,
        min_ranking_sample = settings.min_ranking_sample,
        reporting_period_days = settings.reporting_period_days,
        "configuration loaded"
    );

    let pool = init_database(&settings.database_path).await?;

    let case_store = SqliteCaseStore::new(pool.clone());
    let specialist_store = SqliteSpecialistStore::new(pool.clone());
    let notifier = WebhookNotifier::new(settings.notify_url.clone());
    if settings.notify_url.is_none() {
        info!("notify_url not configured; violation notices will be skipped");
    }

    let engine = ConsensusEngine::new(
        case_store,
        specialist_store,
        notifier,
        settings.quorum_size,
        settings.storage_timeout(),
    );

    // The scheduler shares the specialist table with the engine but runs on
    // its own store handle and timer.
    let scheduler = LevelingScheduler::new(SqliteSpecialistStore::new(pool.clone()), &settings);
    tokio::spawn(scheduler.run());

    let state = AppState::new(engine);
    let app = build_router(state);

    let addr = format!("127.0.0.1:{}", settings.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("roadwatch-review listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
