//! Per-server configuration records.

use rusqlite::{params, Connection, OptionalExtension};

use crate::anilist::TitleFormat;
use crate::core::{AppError, AppResult};

/// Who may run configuration commands on a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionPolicy {
    /// Anyone on the server.
    Any,
    /// Holders of the configured role (the server owner always qualifies).
    Role,
    /// The server owner only.
    #[default]
    Owner,
}

impl PermissionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionPolicy::Any => "ANY",
            PermissionPolicy::Role => "ROLE",
            PermissionPolicy::Owner => "OWNER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ANY" => Some(PermissionPolicy::Any),
            "ROLE" => Some(PermissionPolicy::Role),
            "OWNER" => Some(PermissionPolicy::Owner),
            _ => None,
        }
    }

    /// Whether a member may run configuration commands under this policy.
    ///
    /// Each case returns its own result; `Role` also admits the owner so a
    /// server can never lock itself out by deleting the configured role.
    pub fn allows(&self, is_server_owner: bool, has_required_role: bool) -> bool {
        match self {
            PermissionPolicy::Any => true,
            PermissionPolicy::Role => is_server_owner || has_required_role,
            PermissionPolicy::Owner => is_server_owner,
        }
    }
}

/// One row per chat server. Created lazily on first command use.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_id: String,
    pub permission: PermissionPolicy,
    /// Only meaningful when `permission` is `Role`.
    pub permission_role_id: Option<String>,
    pub title_format: TitleFormat,
}

impl ServerConfig {
    /// Default configuration for a server seen for the first time.
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            permission: PermissionPolicy::default(),
            permission_role_id: None,
            title_format: TitleFormat::default(),
        }
    }
}

fn parse_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServerConfig> {
    let permission: String = row.get(1)?;
    let title_format: String = row.get(3)?;
    Ok(ServerConfig {
        server_id: row.get(0)?,
        permission: PermissionPolicy::parse(&permission).unwrap_or_default(),
        permission_role_id: row.get(2)?,
        title_format: TitleFormat::parse(&title_format).unwrap_or_default(),
    })
}

/// Get a server's configuration, if one has been created.
pub fn get_server_config(conn: &Connection, server_id: &str) -> AppResult<Option<ServerConfig>> {
    let config = conn
        .query_row(
            "SELECT server_id, permission, permission_role_id, title_format
             FROM server_configs WHERE server_id = ?1",
            params![server_id],
            parse_row,
        )
        .optional()?;
    Ok(config)
}

/// Get a server's configuration, creating the default row if absent.
pub fn get_or_create_server_config(conn: &Connection, server_id: &str) -> AppResult<ServerConfig> {
    if let Some(existing) = get_server_config(conn, server_id)? {
        return Ok(existing);
    }
    let config = ServerConfig::new(server_id);
    upsert_server_config(conn, &config)?;
    Ok(config)
}

/// Insert or update a server's configuration.
///
/// Rejects a `Role` policy without a role ID; that pairing is the one
/// invariant the configuration commands rely on.
pub fn upsert_server_config(conn: &Connection, config: &ServerConfig) -> AppResult<()> {
    if config.permission == PermissionPolicy::Role && config.permission_role_id.is_none() {
        return Err(AppError::Validation(
            "permission policy ROLE requires a role id".to_string(),
        ));
    }

    conn.execute(
        "INSERT INTO server_configs (server_id, permission, permission_role_id, title_format, updated_at)
         VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
         ON CONFLICT(server_id) DO UPDATE SET
           permission = ?2,
           permission_role_id = ?3,
           title_format = ?4,
           updated_at = CURRENT_TIMESTAMP",
        params![
            config.server_id,
            config.permission.as_str(),
            config.permission_role_id,
            config.title_format.as_str()
        ],
    )?;
    Ok(())
}
