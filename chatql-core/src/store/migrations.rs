//! Database migrations for the chat schema
//!
//! Each migration is applied atomically and recorded in `schema_version`.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::model::Timestamp;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Users, channels, messages and counters",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,                    -- UserId
                    email TEXT NOT NULL,                    -- as first supplied
                    email_key TEXT NOT NULL UNIQUE,         -- trimmed, lower-cased
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS channels (
                    id TEXT PRIMARY KEY,                    -- ChannelId
                    signature TEXT NOT NULL UNIQUE,         -- MembershipSignature
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS channel_members (
                    channel_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    position INTEGER NOT NULL,              -- insertion order
                    PRIMARY KEY (channel_id, user_id),
                    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE,
                    FOREIGN KEY (user_id) REFERENCES users(id)
                );

                CREATE INDEX IF NOT EXISTS idx_channel_members_user ON channel_members(user_id);

                CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,                    -- MessageId
                    channel_id TEXT NOT NULL,
                    sender_id TEXT NOT NULL,
                    content TEXT NOT NULL,
                    sequence INTEGER NOT NULL UNIQUE,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    FOREIGN KEY (channel_id) REFERENCES channels(id),
                    FOREIGN KEY (sender_id) REFERENCES users(id)
                );

                CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel_id, sequence DESC);
                CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);

                CREATE VIRTUAL TABLE IF NOT EXISTS message_search USING fts5(
                    message_id UNINDEXED,
                    content
                );

                CREATE TABLE IF NOT EXISTS counters (
                    kind TEXT PRIMARY KEY,
                    next_value INTEGER NOT NULL,
                    version INTEGER NOT NULL
                );
            "#,
        },
    ]
}

/// Get current schema version from database
pub fn current_version(conn: &Connection) -> Result<i32, rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    let current = current_version(conn)?;

    for migration in get_migrations().into_iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;

        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Timestamp::now().as_millis()],
        )?;

        tx.commit()?;

        info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
    }

    Ok(())
}

/// Get the latest migration version available
pub fn latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}
