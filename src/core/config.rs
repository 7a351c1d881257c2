use once_cell::sync::Lazy;
use std::env;

/// Configuration constants for the announcement engine
/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: database.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "database.sqlite".to_string()));

/// AniList GraphQL endpoint
/// Read from ANILIST_API_URL environment variable
/// Default: https://graphql.anilist.co
pub static ANILIST_API_URL: Lazy<String> =
    Lazy::new(|| env::var("ANILIST_API_URL").unwrap_or_else(|_| "https://graphql.anilist.co".to_string()));

/// Scheduling cycle configuration
pub mod scheduler {
    use std::time::Duration;

    /// Width of the airing lookahead window (in seconds)
    pub const WINDOW_SECS: i64 = 24 * 60 * 60;

    /// How long before the window's right edge the next cycle starts (in seconds)
    ///
    /// Guarantees consecutive windows overlap so an episode airing exactly at
    /// a window boundary is never missed.
    pub const REARM_LEAD_SECS: i64 = 60;

    /// Lookahead window duration
    pub fn window() -> Duration {
        Duration::from_secs(WINDOW_SECS as u64)
    }

    /// Time to wait between cycle starts: one window minus the re-arm lead
    pub fn rearm_delay() -> Duration {
        Duration::from_secs((WINDOW_SECS - REARM_LEAD_SECS) as u64)
    }
}

/// AniList client configuration
pub mod anilist {
    use std::time::Duration;

    /// Timeout for a single GraphQL request (in seconds)
    pub const HTTP_TIMEOUT_SECS: u64 = 10;

    /// HTTP timeout duration
    pub fn http_timeout() -> Duration {
        Duration::from_secs(HTTP_TIMEOUT_SECS)
    }
}
