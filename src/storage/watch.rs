//! Watch configuration records: one row per (channel, media) pair.

use rusqlite::{params, Connection, OptionalExtension};

use crate::core::AppResult;

/// Discussion-thread auto-archive duration, in minutes.
///
/// The chat platform only accepts these four values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadArchiveTime {
    OneHour,
    #[default]
    OneDay,
    ThreeDays,
    SevenDays,
}

impl ThreadArchiveTime {
    pub fn minutes(&self) -> u32 {
        match self {
            ThreadArchiveTime::OneHour => 60,
            ThreadArchiveTime::OneDay => 1440,
            ThreadArchiveTime::ThreeDays => 4320,
            ThreadArchiveTime::SevenDays => 10080,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        match minutes {
            60 => Some(ThreadArchiveTime::OneHour),
            1440 => Some(ThreadArchiveTime::OneDay),
            4320 => Some(ThreadArchiveTime::ThreeDays),
            10080 => Some(ThreadArchiveTime::SevenDays),
            _ => None,
        }
    }
}

/// A (channel, media) tracking record with delivery preferences.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub id: i64,
    pub channel_id: String,
    pub media_id: i64,
    /// Role to mention alongside the announcement, if any.
    pub ping_role: Option<String>,
    pub create_threads: bool,
    pub thread_archive: ThreadArchiveTime,
    /// True once the tracked item's final episode has aired.
    pub completed: bool,
}

fn parse_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WatchConfig> {
    let archive_minutes: u32 = row.get(5)?;
    Ok(WatchConfig {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        media_id: row.get(2)?,
        ping_role: row.get(3)?,
        create_threads: row.get::<_, i32>(4)? != 0,
        thread_archive: ThreadArchiveTime::from_minutes(archive_minutes).unwrap_or_default(),
        completed: row.get::<_, i32>(6)? != 0,
    })
}

const SELECT_COLUMNS: &str = "id, channel_id, media_id, ping_role, create_threads, thread_archive_minutes, completed";

/// Create or update the watch for a (channel, media) pair.
///
/// Re-watching a completed show clears the completed flag so a new season
/// announces again. Returns the row ID.
pub fn upsert_watch(
    conn: &Connection,
    channel_id: &str,
    media_id: i64,
    ping_role: Option<&str>,
    create_threads: bool,
    thread_archive: ThreadArchiveTime,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO watch_configs (channel_id, media_id, ping_role, create_threads, thread_archive_minutes, completed, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, CURRENT_TIMESTAMP)
         ON CONFLICT(channel_id, media_id) DO UPDATE SET
           ping_role = ?3,
           create_threads = ?4,
           thread_archive_minutes = ?5,
           completed = 0,
           updated_at = CURRENT_TIMESTAMP",
        params![channel_id, media_id, ping_role, create_threads, thread_archive.minutes()],
    )?;

    let id: i64 = conn.query_row(
        "SELECT id FROM watch_configs WHERE channel_id = ?1 AND media_id = ?2",
        params![channel_id, media_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Get the watch for a (channel, media) pair regardless of completion.
pub fn get_watch(conn: &Connection, channel_id: &str, media_id: i64) -> AppResult<Option<WatchConfig>> {
    let watch = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM watch_configs WHERE channel_id = ?1 AND media_id = ?2"),
            params![channel_id, media_id],
            parse_row,
        )
        .optional()?;
    Ok(watch)
}

/// Remove a watch. Returns true when a row was actually deleted.
pub fn remove_watch(conn: &Connection, channel_id: &str, media_id: i64) -> AppResult<bool> {
    let removed = conn.execute(
        "DELETE FROM watch_configs WHERE channel_id = ?1 AND media_id = ?2",
        params![channel_id, media_id],
    )?;
    Ok(removed > 0)
}

/// Distinct media IDs with at least one non-completed watch.
///
/// This is the set the scheduling cycle polls the catalog for.
pub fn list_active_media_ids(conn: &Connection) -> AppResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT DISTINCT media_id FROM watch_configs WHERE completed = 0 ORDER BY media_id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

/// All non-completed watches for a media ID, across every server.
pub fn find_watches_for_media(conn: &Connection, media_id: i64) -> AppResult<Vec<WatchConfig>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM watch_configs WHERE media_id = ?1 AND completed = 0 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![media_id], parse_row)?;

    let mut watches = Vec::new();
    for row in rows {
        watches.push(row?);
    }
    Ok(watches)
}

/// All non-completed watches announced into a channel.
pub fn find_watches_for_channel(conn: &Connection, channel_id: &str) -> AppResult<Vec<WatchConfig>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM watch_configs WHERE channel_id = ?1 AND completed = 0 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![channel_id], parse_row)?;

    let mut watches = Vec::new();
    for row in rows {
        watches.push(row?);
    }
    Ok(watches)
}

/// Mark every watch for a media ID completed. Idempotent.
///
/// Returns how many rows changed (zero on the second call is fine).
pub fn mark_completed(conn: &Connection, media_id: i64) -> AppResult<usize> {
    let changed = conn.execute(
        "UPDATE watch_configs SET completed = 1, updated_at = CURRENT_TIMESTAMP
         WHERE media_id = ?1 AND completed = 0",
        params![media_id],
    )?;
    Ok(changed)
}
