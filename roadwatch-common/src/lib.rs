//! # Roadwatch Common Library
//!
//! Shared code for the Roadwatch review services including:
//! - Error taxonomy for rating submission and level reconciliation
//! - Configuration loading
//! - Database initialization and schema
//! - Data models (cases, ratings, specialists)

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use error::{Error, Result};
