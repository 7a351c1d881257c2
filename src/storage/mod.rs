//! SQLite-backed configuration store.
//!
//! Holds the persistent records the scheduler reasons about: one
//! `ServerConfig` per chat server and one `WatchConfig` per
//! (channel, media) pair. The scheduler's own queue/timer state is
//! deliberately NOT persisted; it is re-derived from these tables on
//! every process start.

pub mod db;
pub mod server;
pub mod watch;

pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use server::{PermissionPolicy, ServerConfig};
pub use watch::{ThreadArchiveTime, WatchConfig};
