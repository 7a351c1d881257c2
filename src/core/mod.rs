//! Core utilities: configuration and centralized error types.

pub mod config;
pub mod error;

pub use error::{AppError, AppResult};
