use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and ensures the
/// schema exists on the first connection.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder().max_size(10).build(manager)?;

    let conn = pool.get()?;
    if let Err(e) = init_schema(&conn) {
        log::error!("Failed to initialize schema: {}", e);
    }

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is automatically returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Create the configuration tables if they don't exist yet.
///
/// `watch_configs` is the unit the scheduling cycle reasons about: one row
/// per (channel, media) pair, unique on that pair. `completed` flips to 1
/// when the final episode has aired.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS server_configs (
            server_id TEXT PRIMARY KEY,
            permission TEXT NOT NULL DEFAULT 'ANY',
            permission_role_id TEXT DEFAULT NULL,
            title_format TEXT NOT NULL DEFAULT 'ROMAJI',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS watch_configs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id TEXT NOT NULL,
            media_id INTEGER NOT NULL,
            ping_role TEXT DEFAULT NULL,
            create_threads INTEGER NOT NULL DEFAULT 0,
            thread_archive_minutes INTEGER NOT NULL DEFAULT 1440,
            completed INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(channel_id, media_id)
        );
        CREATE INDEX IF NOT EXISTS idx_watch_configs_media ON watch_configs(media_id);",
    )
}
