//! Database access layer shared by the review services

pub mod init;

pub use init::init_database;
