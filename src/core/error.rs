use thiserror::Error;

use crate::anilist::QueryError;

/// Centralized error types for the announcement engine
///
/// All errors in the library are converted to this enum for consistent error handling.
/// Uses `thiserror` for automatic error conversion and display formatting.
///
/// No variant is fatal: the worst outcome of any single failure is that one
/// cycle's or one episode's announcement is delayed or incomplete.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// AniList query errors (transport or error payload)
    #[error("AniList error: {0}")]
    Query(#[from] QueryError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
