//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up
//! idempotently (every statement is `CREATE ... IF NOT EXISTS`).

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Ratings reference cases and specialists
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while one submission writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_specialists_table(&pool).await?;
    create_cases_table(&pool).await?;
    create_ratings_table(&pool).await?;

    // Reference data joined in for violation notices; maintained by the
    // surrounding CRUD services, only read here.
    create_violations_table(&pool).await?;
    create_contacts_table(&pool).await?;
    create_cameras_table(&pool).await?;

    Ok(pool)
}

async fn create_specialists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS specialists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name TEXT NOT NULL,
            level INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
            current_streak INTEGER NOT NULL DEFAULT 0,
            best_streak INTEGER NOT NULL DEFAULT 0,
            is_verified INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_cases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            camera_id TEXT NOT NULL,
            transport TEXT NOT NULL,
            violation_id TEXT NOT NULL,
            violation_value TEXT NOT NULL,
            assigned_level INTEGER NOT NULL CHECK (assigned_level >= 1),
            working_level INTEGER NOT NULL,
            occurred_at TEXT NOT NULL,
            photo_url TEXT NOT NULL,
            is_solved INTEGER NOT NULL DEFAULT 0,
            verdict INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cases_open_level
         ON cases (working_level) WHERE is_solved = 0",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_ratings_table(pool: &SqlitePool) -> Result<()> {
    // The UNIQUE constraint is what makes duplicate submissions race-safe:
    // the insert itself fails, there is no check-then-insert window.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ratings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            case_id INTEGER NOT NULL REFERENCES cases(id),
            specialist_id INTEGER NOT NULL REFERENCES specialists(id),
            choice INTEGER NOT NULL,
            tier INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'Unknown'
                CHECK (status IN ('Unknown', 'Correct', 'Incorrect')),
            submitted_at TEXT NOT NULL,
            UNIQUE (case_id, specialist_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ratings_case_tier ON ratings (case_id, tier)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ratings_specialist_submitted
         ON ratings (specialist_id, submitted_at)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_violations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS violations (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            amount INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_contacts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contacts (
            transport TEXT PRIMARY KEY,
            email TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_cameras_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cameras (
            id TEXT PRIMARY KEY,
            coordinates TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
