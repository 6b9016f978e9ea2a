use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::America::New_York;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;

use crate::auth;
use crate::rotator::{CredentialStore, DirectoryEntry, RoleInfo, UserDirectory, UserId};

// key, label, can_manage
const DEFAULT_ROLES: &[(&str, &str, bool)] = &[
    ("administrator", "Administrator", true),
    ("editor", "Editor", false),
    ("author", "Author", false),
    ("contributor", "Contributor", false),
    ("subscriber", "Subscriber", false),
];

// Converts UTC timestamp strings (e.g. "2025-10-18 13:32:39") into America/New_York time (EDT/EST).
pub fn to_eastern_time(utc_str: &str) -> Option<String> {
    let naive = NaiveDateTime::parse_from_str(utc_str, "%Y-%m-%d %H:%M:%S").ok()?;
    let utc_dt: DateTime<Utc> = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);
    Some(utc_dt.with_timezone(&New_York).format("%Y-%m-%d %H:%M:%S %Z").to_string())
}

// Open (or create) the user database at `path` and make sure the schema exists.
pub fn get_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open user database {}", path.display()))?;
    init_user_db(&conn)?;
    Ok(conn)
}

// Initialize all required database tables and indexes.
pub fn init_user_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=FULL;
        PRAGMA foreign_keys=ON;
        PRAGMA secure_delete=ON;
        PRAGMA temp_store=MEMORY;
        "#,
    )
    .context("Failed to apply secure PRAGMA settings")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            username        TEXT NOT NULL UNIQUE,
            hashed_password TEXT NOT NULL,
            is_active       INTEGER DEFAULT 1,
            last_login_time TEXT,
            created_at      TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at      TEXT
        );

        CREATE TABLE IF NOT EXISTS roles (
            role_key   TEXT PRIMARY KEY,
            label      TEXT NOT NULL,
            can_manage INTEGER NOT NULL DEFAULT 0,
            position   INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS user_roles (
            user_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role_key TEXT NOT NULL REFERENCES roles(role_key) ON DELETE CASCADE,
            PRIMARY KEY (user_id, role_key)
        );

        CREATE INDEX IF NOT EXISTS ix_users_username ON users(username);
        CREATE INDEX IF NOT EXISTS ix_user_roles_role ON user_roles(role_key);
        "#,
    )
    .context("Failed to initialize user tables")?;

    seed_default_roles(conn)
}

// Insert the stock roles if they are missing. Existing labels are left alone.
pub fn seed_default_roles(conn: &Connection) -> Result<()> {
    for (position, (key, label, can_manage)) in DEFAULT_ROLES.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO roles (role_key, label, can_manage, position) VALUES (?1, ?2, ?3, ?4)",
            params![key, label, *can_manage as i64, position as i64],
        )
        .with_context(|| format!("Failed to seed role '{key}'"))?;
    }
    Ok(())
}

// Insert a user together with its role assignments.
pub fn insert_user(conn: &mut Connection, username: &str, hashed: &str, roles: &[&str]) -> Result<UserId> {
    let tx = conn.transaction().context("Failed to start transaction")?;
    tx.execute(
        "INSERT INTO users (username, hashed_password, updated_at) VALUES (?1, ?2, datetime('now'))",
        params![username, hashed],
    )
    .context("Failed to insert user")?;
    let id = tx.last_insert_rowid();

    for role in roles {
        tx.execute(
            "INSERT INTO user_roles (user_id, role_key) VALUES (?1, ?2)",
            params![id, role],
        )
        .with_context(|| format!("Failed to assign role '{role}' to '{username}'"))?;
    }
    tx.commit().context("Failed to commit transaction")?;
    Ok(id)
}

// Check if a username already exists.
pub fn user_exists(conn: &Connection, username: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 COLLATE NOCASE",
            params![username],
            |r| r.get(0),
        )
        .context("Failed to query user existence")?;
    Ok(count > 0)
}

// True when at least one active account holds a managing role.
pub fn has_administrator(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM users u
             JOIN user_roles ur ON ur.user_id = u.id
             JOIN roles r ON r.role_key = ur.role_key
             WHERE r.can_manage = 1 AND u.is_active = 1",
            [],
            |r| r.get(0),
        )
        .context("Failed to look for an administrator")?;
    Ok(count > 0)
}

pub struct LoginRow {
    pub id: UserId,
    pub username: String,
    pub hashed_password: String,
    pub is_active: bool,
}

pub fn find_login(conn: &Connection, username: &str) -> Result<Option<LoginRow>> {
    conn.query_row(
        "SELECT id, username, hashed_password, is_active FROM users WHERE username = ?1 COLLATE NOCASE",
        params![username],
        |r| {
            Ok(LoginRow {
                id: r.get(0)?,
                username: r.get(1)?,
                hashed_password: r.get(2)?,
                is_active: r.get::<_, i64>(3)? == 1,
            })
        },
    )
    .optional()
    .context("Failed to look up login")
}

pub fn touch_last_login(conn: &Connection, user: UserId) -> Result<()> {
    conn.execute(
        "UPDATE users SET last_login_time = datetime('now'), updated_at = datetime('now') WHERE id = ?1",
        params![user],
    )
    .context("Failed to update last login time")?;
    Ok(())
}

pub fn roles_of(conn: &Connection, user: UserId) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare("SELECT role_key FROM user_roles WHERE user_id = ?1")
        .context("Failed to prepare role query")?;
    let roles = stmt
        .query_map(params![user], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(roles)
}

pub fn can_manage(conn: &Connection, user: UserId) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM user_roles ur
             JOIN roles r ON r.role_key = ur.role_key
             WHERE ur.user_id = ?1 AND r.can_manage = 1",
            params![user],
            |r| r.get(0),
        )
        .context("Failed to check management capability")?;
    Ok(count > 0)
}

/// Row for the admin overview table.
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub roles: String,
    pub is_active: bool,
    pub updated_at: Option<String>,
}

pub fn list_user_summaries(conn: &Connection) -> Result<Vec<UserSummary>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT u.id, u.username, COALESCE(GROUP_CONCAT(ur.role_key, ','), ''), u.is_active, u.updated_at
              FROM users u
              LEFT JOIN user_roles ur ON ur.user_id = u.id
             GROUP BY u.id
             ORDER BY u.id ASC
            "#,
        )
        .context("Failed to prepare query for all users")?;

    let rows = stmt
        .query_map([], |r| {
            Ok(UserSummary {
                id: r.get(0)?,
                username: r.get(1)?,
                roles: r.get(2)?,
                is_active: r.get::<_, i64>(3)? == 1,
                updated_at: r.get(4)?,
            })
        })
        .context("Failed to query users")?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/*------------------------ Directory / credential store ---------------------*/

/// SQLite-backed user directory and credential store.
pub struct SqliteUserStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteUserStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn entry_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<(UserId, Option<String>)> {
    Ok((r.get(0)?, r.get(1)?))
}

// Fold (id, role) rows ordered by id into one entry per user.
fn group_entries(rows: Vec<(UserId, Option<String>)>) -> Vec<DirectoryEntry> {
    let mut entries: Vec<DirectoryEntry> = Vec::new();
    for (id, role) in rows {
        if entries.last().is_none_or(|e| e.id != id) {
            entries.push(DirectoryEntry { id, roles: BTreeSet::new() });
        }
        if let (Some(entry), Some(role)) = (entries.last_mut(), role) {
            entry.roles.insert(role);
        }
    }
    entries
}

impl UserDirectory for SqliteUserStore<'_> {
    fn list_users(&self, role: Option<&str>) -> Result<Vec<DirectoryEntry>> {
        let rows = match role {
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT u.id, ur.role_key FROM users u
                     LEFT JOIN user_roles ur ON ur.user_id = u.id
                     ORDER BY u.id",
                )?;
                let rows = stmt
                    .query_map([], entry_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .context("Failed to list users")?;
                rows
            }
            Some(role) => {
                let mut stmt = self.conn.prepare(
                    "SELECT u.id, ur.role_key FROM users u
                     JOIN user_roles ur ON ur.user_id = u.id
                     WHERE u.id IN (SELECT user_id FROM user_roles WHERE role_key = ?1)
                     ORDER BY u.id",
                )?;
                let rows = stmt
                    .query_map(params![role], entry_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .with_context(|| format!("Failed to list users in role '{role}'"))?;
                rows
            }
        };

        Ok(group_entries(rows))
    }

    fn list_roles(&self) -> Result<Vec<RoleInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT role_key, label FROM roles ORDER BY position, role_key")
            .context("Failed to prepare role listing")?;
        let roles = stmt
            .query_map([], |r| Ok(RoleInfo { key: r.get(0)?, label: r.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list roles")?;
        Ok(roles)
    }
}

impl CredentialStore for SqliteUserStore<'_> {
    fn set_credential(&self, user: UserId, new_value: &str) -> Result<()> {
        let hashed = auth::hash_password(new_value)?;
        let changed = self
            .conn
            .execute(
                "UPDATE users SET hashed_password = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![hashed, user],
            )
            .with_context(|| format!("Failed to store new password for user #{user}"))?;
        if changed == 0 {
            bail!("User #{user} not found");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_user_db(&conn).unwrap();
        conn
    }

    #[test]
    fn default_roles_are_seeded_in_order() {
        let conn = test_db();
        let roles = SqliteUserStore::new(&conn).list_roles().unwrap();
        let keys: Vec<&str> = roles.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["administrator", "editor", "author", "contributor", "subscriber"]);

        // Idempotent.
        init_user_db(&conn).unwrap();
        assert_eq!(SqliteUserStore::new(&conn).list_roles().unwrap().len(), 5);
    }

    #[test]
    fn list_users_groups_roles() {
        let mut conn = test_db();
        let a = insert_user(&mut conn, "alice", "x", &["administrator", "editor"]).unwrap();
        let b = insert_user(&mut conn, "bob", "x", &["author"]).unwrap();
        let c = insert_user(&mut conn, "carol", "x", &[]).unwrap();

        let store = SqliteUserStore::new(&conn);
        let all = store.list_users(None).unwrap();
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(all[0].roles, BTreeSet::from(["administrator".to_string(), "editor".to_string()]));
        assert!(all[2].roles.is_empty());

        let editors = store.list_users(Some("editor")).unwrap();
        assert_eq!(editors.len(), 1);
        assert_eq!(editors[0].id, a);
        assert_eq!(editors[0].roles.len(), 2);
    }

    #[test]
    fn unknown_role_assignment_fails() {
        let mut conn = test_db();
        assert!(insert_user(&mut conn, "dave", "x", &["pirate"]).is_err());
        assert!(!user_exists(&conn, "dave").unwrap());
    }

    #[test]
    fn set_credential_unknown_user_fails() {
        let conn = test_db();
        let err = SqliteUserStore::new(&conn).set_credential(42, "Whatever-123!").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn management_capability_follows_roles() {
        let mut conn = test_db();
        assert!(!has_administrator(&conn).unwrap());
        let a = insert_user(&mut conn, "alice", "x", &["administrator"]).unwrap();
        let b = insert_user(&mut conn, "bob", "x", &["editor"]).unwrap();
        assert!(can_manage(&conn, a).unwrap());
        assert!(!can_manage(&conn, b).unwrap());
        assert!(has_administrator(&conn).unwrap());
    }

    #[test]
    fn eastern_time_conversion() {
        let s = to_eastern_time("2025-01-15 17:00:00").unwrap();
        assert_eq!(s, "2025-01-15 12:00:00 EST");
        assert!(to_eastern_time("yesterday").is_none());
    }
}
