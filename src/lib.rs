//! AniSched - episode-airing announcement engine for chat bots
//!
//! This library provides the core of an announcement bot: it tracks which
//! chat channels watch which media, polls the AniList catalog for episodes
//! airing in the next 24 hours, arms one timer per upcoming episode, and
//! delivers an embed to every watching channel when the timer fires.
//!
//! # Module Structure
//!
//! - `core`: Configuration and error types
//! - `storage`: SQLite-backed server/watch configuration records
//! - `anilist`: Catalog client, data model, and media-ID resolver
//! - `render`: Pure embed/content rendering
//! - `chat`: Chat-platform gateway trait (implemented by the bot shell)
//! - `scheduler`: Polling cycle, timer state, and the announcement dispatcher

pub mod anilist;
pub mod chat;
pub mod core;
pub mod render;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult};
pub use crate::storage::{create_pool, get_connection, DbConnection, DbPool};
