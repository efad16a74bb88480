//! SQLite-backed [`ChatStore`]
//!
//! Uses connection pooling for concurrent access. Every call runs its
//! blocking rusqlite work on `spawn_blocking`; multi-row writes use
//! immediate transactions so they take the write lock up front.

use super::error::{StoreError, StoreResult};
use super::{migrations, ChatStore, MessageFilter};
use crate::config::StoreConfig;
use crate::model::{
    Channel, ChannelId, Counter, CounterKind, MembershipSignature, Message, MessageId, Timestamp,
    User, UserId,
};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Type, Value};
use rusqlite::{
    ffi, params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior,
};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str =
    "m.id, m.channel_id, m.sender_id, m.content, m.sequence, m.created_at, m.updated_at";

/// SQLite-backed chat store
pub struct SqlChatStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlChatStore {
    /// Open (creating if needed) the database described by `config`
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = config.busy_timeout;
        let enable_wal = config.enable_wal;
        let manager = SqliteConnectionManager::file(&config.database_path)
            .with_init(move |conn| init_connection(conn, busy_timeout, enable_wal));
        let pool = Pool::builder().max_size(config.pool_size).build(manager)?;

        info!(
            path = %config.database_path.display(),
            pool_size = config.pool_size,
            "Opened chat store"
        );

        Self::with_pool(pool)
    }

    /// Open a file database with default store settings
    pub fn open_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(&StoreConfig {
            database_path: path.as_ref().to_path_buf(),
            ..StoreConfig::default()
        })
    }

    /// Create a new in-memory store
    ///
    /// Limited to one pooled connection: each SQLite in-memory connection is
    /// its own database.
    pub fn memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| init_connection(conn, Duration::from_secs(5), false));
        let pool = Pool::builder().max_size(1).build(manager)?;

        Self::with_pool(pool)
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>) -> StoreResult<Self> {
        let mut conn = pool.get()?;
        migrations::migrate(&mut conn)?;
        drop(conn);

        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("Task join error: {}", e)))?
    }
}

fn init_connection(
    conn: &mut Connection,
    busy_timeout: Duration,
    enable_wal: bool,
) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    if enable_wal {
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }

    Ok(())
}

/// Map uniqueness violations to [`StoreError::Conflict`]
fn unique_conflict(err: rusqlite::Error, describe: impl FnOnce() -> String) -> StoreError {
    let unique = matches!(
        &err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    );

    if unique {
        StoreError::Conflict(describe())
    } else {
        StoreError::Database(err)
    }
}

/// Build an FTS5 query OR-ing each whitespace-separated term
///
/// Returns `None` when no term contains anything searchable.
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn id_at<T: From<Uuid>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map(T::from)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: id_at(row, 0)?,
        email: row.get(1)?,
        created_at: Timestamp::from_millis(row.get(2)?),
        updated_at: Timestamp::from_millis(row.get(3)?),
    })
}

fn load_user(conn: &Connection, id: &UserId) -> StoreResult<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, email, created_at, updated_at FROM users WHERE id = ?",
            params![id.to_string()],
            user_from_row,
        )
        .optional()?;

    Ok(user)
}

fn load_channel(conn: &Connection, id: &ChannelId) -> StoreResult<Option<Channel>> {
    let header = conn
        .query_row(
            "SELECT created_at, updated_at FROM channels WHERE id = ?",
            params![id.to_string()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    let Some((created_at, updated_at)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare_cached(
        "SELECT u.id, u.email, u.created_at, u.updated_at
         FROM channel_members cm JOIN users u ON u.id = cm.user_id
         WHERE cm.channel_id = ?
         ORDER BY cm.position",
    )?;
    let members = stmt
        .query_map(params![id.to_string()], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Channel {
        id: *id,
        members,
        created_at: Timestamp::from_millis(created_at),
        updated_at: Timestamp::from_millis(updated_at),
    }))
}

/// A message row before its channel and sender are resolved
struct MessageRow {
    id: MessageId,
    channel_id: ChannelId,
    sender_id: UserId,
    content: String,
    sequence: i64,
    created_at: i64,
    updated_at: i64,
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: id_at(row, 0)?,
        channel_id: id_at(row, 1)?,
        sender_id: id_at(row, 2)?,
        content: row.get(3)?,
        sequence: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Resolve channel and sender references, loading each channel once
fn hydrate(conn: &Connection, rows: Vec<MessageRow>) -> StoreResult<Vec<Message>> {
    let mut channels: HashMap<ChannelId, Channel> = HashMap::new();
    let mut messages = Vec::with_capacity(rows.len());

    for row in rows {
        let channel = match channels.get(&row.channel_id) {
            Some(channel) => channel.clone(),
            None => {
                let channel = load_channel(conn, &row.channel_id)?.ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "message {} references missing channel {}",
                        row.id, row.channel_id
                    ))
                })?;
                channels.insert(row.channel_id, channel.clone());
                channel
            }
        };

        let sender = match channel.members.iter().find(|member| member.id == row.sender_id) {
            Some(member) => member.clone(),
            None => load_user(conn, &row.sender_id)?.ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "message {} references missing sender {}",
                    row.id, row.sender_id
                ))
            })?,
        };

        messages.push(Message {
            id: row.id,
            channel,
            sender,
            content: row.content,
            sequence: row.sequence,
            created_at: Timestamp::from_millis(row.created_at),
            updated_at: Timestamp::from_millis(row.updated_at),
        });
    }

    Ok(messages)
}

#[async_trait]
impl ChatStore for SqlChatStore {
    // ===== Users =====

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let user = user.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (id, email, email_key, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    user.id.to_string(),
                    user.email,
                    User::email_key(&user.email),
                    user.created_at.as_millis(),
                    user.updated_at.as_millis(),
                ],
            )
            .map_err(|e| unique_conflict(e, || format!("e-mail {} already registered", user.email)))?;

            debug!(user_id = %user.id, "Inserted user");
            Ok(())
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let key = User::email_key(email);

        self.with_conn(move |conn| {
            let user = conn
                .query_row(
                    "SELECT id, email, created_at, updated_at FROM users WHERE email_key = ?",
                    params![key],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        let id = *id;
        self.with_conn(move |conn| load_user(conn, &id)).await
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, created_at, updated_at FROM users ORDER BY email_key, id",
            )?;
            let users = stmt
                .query_map([], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
        .await
    }

    // ===== Counters =====

    async fn load_counter(&self, kind: CounterKind) -> StoreResult<Option<Counter>> {
        self.with_conn(move |conn| {
            let counter = conn
                .query_row(
                    "SELECT next_value, version FROM counters WHERE kind = ?",
                    params![kind.as_str()],
                    |row| {
                        Ok(Counter {
                            kind,
                            next_value: row.get(0)?,
                            version: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(counter)
        })
        .await
    }

    async fn insert_counter(&self, counter: &Counter) -> StoreResult<()> {
        let counter = *counter;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO counters (kind, next_value, version) VALUES (?, ?, ?)",
                params![counter.kind.as_str(), counter.next_value, counter.version],
            )
            .map_err(|e| unique_conflict(e, || format!("counter {} already exists", counter.kind)))?;
            Ok(())
        })
        .await
    }

    async fn compare_and_set_counter(
        &self,
        current: &Counter,
        next_value: i64,
    ) -> StoreResult<()> {
        let current = *current;

        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE counters SET next_value = ?1, version = version + 1
                 WHERE kind = ?2 AND version = ?3",
                params![next_value, current.kind.as_str(), current.version],
            )?;

            if changed == 0 {
                return Err(StoreError::Conflict(format!(
                    "counter {} changed since version {}",
                    current.kind, current.version
                )));
            }

            Ok(())
        })
        .await
    }

    // ===== Channels =====

    async fn insert_channel(&self, channel: &Channel) -> StoreResult<()> {
        let channel = channel.clone();
        let signature = channel.signature();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            tx.execute(
                "INSERT INTO channels (id, signature, created_at, updated_at) VALUES (?, ?, ?, ?)",
                params![
                    channel.id.to_string(),
                    signature.as_str(),
                    channel.created_at.as_millis(),
                    channel.updated_at.as_millis(),
                ],
            )
            .map_err(|e| {
                unique_conflict(e, || format!("membership {} already has a channel", signature))
            })?;

            for (position, member) in channel.members.iter().enumerate() {
                tx.execute(
                    "INSERT INTO channel_members (channel_id, user_id, position) VALUES (?, ?, ?)",
                    params![channel.id.to_string(), member.id.to_string(), position as i64],
                )?;
            }

            tx.commit()?;

            debug!(channel_id = %channel.id, members = channel.members.len(), "Inserted channel");
            Ok(())
        })
        .await
    }

    async fn find_channel_by_signature(
        &self,
        signature: &MembershipSignature,
    ) -> StoreResult<Option<Channel>> {
        let signature = signature.clone();

        self.with_conn(move |conn| {
            let id: Option<ChannelId> = conn
                .query_row(
                    "SELECT id FROM channels WHERE signature = ?",
                    params![signature.as_str()],
                    |row| id_at(row, 0),
                )
                .optional()?;

            match id {
                Some(id) => load_channel(conn, &id),
                None => Ok(None),
            }
        })
        .await
    }

    async fn get_channel(&self, id: &ChannelId) -> StoreResult<Option<Channel>> {
        let id = *id;
        self.with_conn(move |conn| load_channel(conn, &id)).await
    }

    async fn list_channels_for_member(&self, user_id: &UserId) -> StoreResult<Vec<Channel>> {
        let user_id = *user_id;

        self.with_conn(move |conn| {
            let ids: Vec<ChannelId> = {
                let mut stmt = conn.prepare(
                    "SELECT channel_id FROM channel_members WHERE user_id = ? ORDER BY channel_id",
                )?;
                let ids = stmt
                    .query_map(params![user_id.to_string()], |row| id_at(row, 0))?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            };

            let mut channels = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(channel) = load_channel(conn, &id)? {
                    channels.push(channel);
                }
            }
            Ok(channels)
        })
        .await
    }

    async fn count_channels(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    // ===== Messages =====

    async fn insert_message(&self, message: &Message) -> StoreResult<()> {
        let message = message.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            tx.execute(
                "INSERT INTO messages (id, channel_id, sender_id, content, sequence, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    message.id.to_string(),
                    message.channel.id.to_string(),
                    message.sender.id.to_string(),
                    message.content,
                    message.sequence,
                    message.created_at.as_millis(),
                    message.updated_at.as_millis(),
                ],
            )
            .map_err(|e| {
                unique_conflict(e, || format!("sequence {} already used", message.sequence))
            })?;

            tx.execute(
                "INSERT INTO message_search (message_id, content) VALUES (?, ?)",
                params![message.id.to_string(), message.content],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_message(&self, id: &MessageId) -> StoreResult<Option<Message>> {
        let id = *id;

        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM messages m WHERE m.id = ?", MESSAGE_COLUMNS),
                    params![id.to_string()],
                    message_row,
                )
                .optional()?;

            match row {
                Some(row) => Ok(hydrate(conn, vec![row])?.pop()),
                None => Ok(None),
            }
        })
        .await
    }

    async fn query_messages(&self, filter: &MessageFilter) -> StoreResult<Vec<Message>> {
        let filter = filter.clone();

        self.with_conn(move |conn| {
            let mut sql = format!(
                "SELECT {} FROM messages m
                 WHERE m.channel_id IN (SELECT channel_id FROM channel_members WHERE user_id = ?)",
                MESSAGE_COLUMNS
            );
            let mut args = vec![Value::Text(filter.member.to_string())];

            if let Some(channel) = &filter.channel {
                sql.push_str(" AND m.channel_id = ?");
                args.push(Value::Text(channel.to_string()));
            }
            if let Some(sender) = &filter.sender {
                sql.push_str(" AND m.sender_id = ?");
                args.push(Value::Text(sender.to_string()));
            }
            if let Some(before) = filter.before_sequence {
                sql.push_str(" AND m.sequence < ?");
                args.push(Value::Integer(before));
            }
            if let Some(text) = &filter.text {
                let Some(query) = fts_query(text) else {
                    return Ok(Vec::new());
                };
                sql.push_str(
                    " AND m.id IN (SELECT message_id FROM message_search WHERE message_search MATCH ?)",
                );
                args.push(Value::Text(query));
            }

            sql.push_str(" ORDER BY m.sequence DESC LIMIT ?");
            args.push(Value::Integer(i64::from(filter.limit)));

            let rows = {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(args.iter()), message_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            hydrate(conn, rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_channel(store: &SqlChatStore, emails: &[&str]) -> Channel {
        let mut members = Vec::new();
        for email in emails {
            let user = User::new(*email);
            store.insert_user(&user).await.unwrap();
            members.push(user);
        }
        let channel = Channel::new(members);
        store.insert_channel(&channel).await.unwrap();
        channel
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("hello world").as_deref(), Some("\"hello\" OR \"world\""));
        assert_eq!(fts_query("say \"hi\"").as_deref(), Some("\"say\" OR \"\"\"hi\"\"\""));
        assert_eq!(fts_query("  !! -- "), None);
    }

    #[tokio::test]
    async fn test_email_uniqueness_is_case_insensitive() {
        let store = SqlChatStore::memory().unwrap();
        store.insert_user(&User::new("Alice@Example.com")).await.unwrap();

        let err = store.insert_user(&User::new("alice@example.COM")).await.unwrap_err();
        assert!(err.is_conflict());

        let found = store.find_user_by_email("ALICE@example.com").await.unwrap().unwrap();
        assert_eq!(found.email, "Alice@Example.com");
    }

    #[tokio::test]
    async fn test_list_users_ordered_by_email() {
        let store = SqlChatStore::memory().unwrap();
        for email in ["carol@example.com", "Alice@example.com", "bob@example.com"] {
            store.insert_user(&User::new(email)).await.unwrap();
        }

        let emails: Vec<String> =
            store.list_users().await.unwrap().into_iter().map(|u| u.email).collect();
        assert_eq!(emails, vec!["Alice@example.com", "bob@example.com", "carol@example.com"]);
    }

    #[tokio::test]
    async fn test_counter_compare_and_set() {
        let store = SqlChatStore::memory().unwrap();
        let fresh = Counter::new(CounterKind::MessageSequence);
        store.insert_counter(&fresh).await.unwrap();
        assert!(store.insert_counter(&fresh).await.unwrap_err().is_conflict());

        store.compare_and_set_counter(&fresh, 2).await.unwrap();

        // Stale version loses
        let err = store.compare_and_set_counter(&fresh, 2).await.unwrap_err();
        assert!(err.is_conflict());

        let current = store.load_counter(CounterKind::MessageSequence).await.unwrap().unwrap();
        assert_eq!(current.next_value, 2);
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn test_channel_members_keep_insertion_order() {
        let store = SqlChatStore::memory().unwrap();
        let channel = seeded_channel(&store, &["zed@example.com", "amy@example.com"]).await;

        let loaded = store.get_channel(&channel.id).await.unwrap().unwrap();
        assert_eq!(loaded, channel);

        let by_signature = store
            .find_channel_by_signature(&channel.signature())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_signature.id, channel.id);
    }

    #[tokio::test]
    async fn test_duplicate_signature_conflicts() {
        let store = SqlChatStore::memory().unwrap();
        let channel = seeded_channel(&store, &["a@example.com", "b@example.com"]).await;

        let mut reversed = channel.members.clone();
        reversed.reverse();
        let err = store.insert_channel(&Channel::new(reversed)).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.count_channels().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sequence_conflicts() {
        let store = SqlChatStore::memory().unwrap();
        let channel = seeded_channel(&store, &["a@example.com"]).await;
        let sender = channel.members[0].clone();

        store
            .insert_message(&Message::new(sender.clone(), channel.clone(), "first", 1))
            .await
            .unwrap();
        let err = store
            .insert_message(&Message::new(sender, channel, "second", 1))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_query_is_scoped_and_hydrated() {
        let store = SqlChatStore::memory().unwrap();
        let ours = seeded_channel(&store, &["a@example.com", "b@example.com"]).await;
        let theirs = seeded_channel(&store, &["c@example.com"]).await;
        let a = ours.members[0].clone();
        let c = theirs.members[0].clone();

        store
            .insert_message(&Message::new(a.clone(), ours.clone(), "Lunch today?", 1))
            .await
            .unwrap();
        store
            .insert_message(&Message::new(c, theirs.clone(), "lunch alone", 2))
            .await
            .unwrap();

        let mut filter = MessageFilter::for_member(a.id, 10);
        filter.text = Some("LUNCH".to_string());
        let found = store.query_messages(&filter).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].channel, ours);
        assert_eq!(found[0].sender, a);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.db");

        {
            let store = SqlChatStore::open_file(&path).unwrap();
            store.insert_user(&User::new("keep@example.com")).await.unwrap();
        }

        let reopened = SqlChatStore::open_file(&path).unwrap();
        assert!(reopened.find_user_by_email("keep@example.com").await.unwrap().is_some());
    }
}
