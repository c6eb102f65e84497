//! SQLite-backed [`ChatStore`](crate::ChatStore).
//!
//! Uses sqlx with WAL journaling and an idempotent schema bootstrap, so a
//! fresh deployment needs no migration tooling. Timestamps are stored as
//! Unix epoch milliseconds; ties on `created_at` are broken by `rowid`,
//! which is insertion order.

use async_trait::async_trait;
use banter_core::{
    Attachment, AttachmentScope, BanterError, BanterResult, Conversation, ConversationSummary,
    EntityKind, Message, MessageRole, StorageError, Timestamp, SUMMARY_SNIPPET_CHARS,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::ChatStore;

/// Durable chat store on a single SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and bootstrap the
    /// schema.
    pub async fn connect(path: &Path) -> BanterResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StorageError::Io {
                        path: parent.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(query_err)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(query_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> BanterResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations(conversation_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attachments (
                id TEXT PRIMARY KEY,
                scope TEXT NOT NULL,
                owner_user_id TEXT,
                uri TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                filename TEXT NOT NULL,
                content_type TEXT,
                size_bytes INTEGER NOT NULL,
                caption TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_attachments_owner ON attachments(owner_user_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_attachments_scope ON attachments(scope, created_at)",
        ] {
            sqlx::query(index).execute(&self.pool).await.map_err(query_err)?;
        }

        Ok(())
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> BanterResult<Conversation> {
        if let Some(id) = conversation_id {
            let existing = sqlx::query(
                "SELECT conversation_id, user_id, created_at FROM conversations \
                 WHERE conversation_id = ?1 AND user_id = ?2",
            )
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
            if let Some(row) = existing {
                return row_to_conversation(&row);
            }
        }

        let id = conversation_id
            .map(str::to_string)
            .unwrap_or_else(banter_core::new_entity_id);
        let created_at = Utc::now();
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO conversations (conversation_id, user_id, created_at) \
             VALUES (?1, ?2, ?3)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        if inserted.rows_affected() == 0 {
            // Lost a race, or the id belongs to another owner.
            let row = sqlx::query(
                "SELECT conversation_id, user_id, created_at FROM conversations \
                 WHERE conversation_id = ?1 AND user_id = ?2",
            )
            .bind(&id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
            return match row {
                Some(row) => row_to_conversation(&row),
                None => Err(StorageError::InsertFailed {
                    entity: EntityKind::Conversation,
                    reason: "conversation id exists under a different owner".to_string(),
                }
                .into()),
            };
        }

        Ok(Conversation {
            conversation_id: id,
            owner_user_id: user_id.to_string(),
            created_at,
        })
    }

    async fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> BanterResult<Message> {
        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(query_err)?;

        // Clamp so created_at never decreases within a conversation, even if
        // the wall clock does.
        let now_ms = Utc::now().timestamp_millis();
        let created_ms = latest.map_or(now_ms, |l| l.max(now_ms));

        let message = Message {
            id: banter_core::new_entity_id(),
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            created_at: millis_to_ts(created_ms)?,
        };

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, user_id, role, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.user_id)
        .bind(message.role.as_db_str())
        .bind(&message.content)
        .bind(created_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            BanterError::from(StorageError::InsertFailed {
                entity: EntityKind::Message,
                reason: e.to_string(),
            })
        })?;

        Ok(message)
    }

    async fn list_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: i64,
    ) -> BanterResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, user_id, role, content, created_at FROM messages \
             WHERE conversation_id = ?1 AND user_id = ?2 \
             ORDER BY created_at ASC, rowid ASC LIMIT ?3",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter().map(row_to_message).collect()
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> BanterResult<Vec<ConversationSummary>> {
        let snippet_len = SUMMARY_SNIPPET_CHARS as i64;
        let rows = sqlx::query(
            "SELECT c.conversation_id, \
                    c.created_at, \
                    COALESCE(MAX(m.created_at), c.created_at) AS last_message_at, \
                    COUNT(m.id) AS message_count, \
                    COALESCE((SELECT SUBSTR(m2.content, 1, ?2) FROM messages m2 \
                              WHERE m2.conversation_id = c.conversation_id \
                              ORDER BY m2.created_at DESC, m2.rowid DESC LIMIT 1), '') AS snippet \
             FROM conversations c \
             LEFT JOIN messages m ON m.conversation_id = c.conversation_id \
             WHERE c.user_id = ?1 \
             GROUP BY c.conversation_id, c.created_at \
             ORDER BY last_message_at DESC, c.conversation_id DESC \
             LIMIT ?3 OFFSET ?4",
        )
        .bind(user_id)
        .bind(snippet_len)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                Ok(ConversationSummary {
                    conversation_id: row.try_get("conversation_id").map_err(query_err)?,
                    created_at: millis_to_ts(row.try_get("created_at").map_err(query_err)?)?,
                    last_message_at: millis_to_ts(
                        row.try_get("last_message_at").map_err(query_err)?,
                    )?,
                    message_count: row.try_get("message_count").map_err(query_err)?,
                    snippet: row.try_get("snippet").map_err(query_err)?,
                })
            })
            .collect()
    }

    async fn delete_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> BanterResult<bool> {
        let mut tx = self.pool.begin().await.map_err(query_err)?;

        let owned: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM conversations WHERE conversation_id = ?1 AND user_id = ?2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?;
        if owned.is_none() {
            tx.rollback().await.map_err(query_err)?;
            return Ok(false);
        }

        // Messages before parent, respecting referential integrity.
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        sqlx::query("DELETE FROM conversations WHERE conversation_id = ?1 AND user_id = ?2")
            .bind(conversation_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(true)
    }

    async fn record_attachment(&self, attachment: &Attachment) -> BanterResult<()> {
        sqlx::query(
            "INSERT INTO attachments \
             (id, scope, owner_user_id, uri, storage_path, filename, content_type, size_bytes, caption, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&attachment.id)
        .bind(attachment.scope.as_db_str())
        .bind(&attachment.owner_user_id)
        .bind(&attachment.uri)
        .bind(&attachment.storage_path)
        .bind(&attachment.filename)
        .bind(&attachment.content_type)
        .bind(attachment.size_bytes)
        .bind(&attachment.caption)
        .bind(attachment.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            BanterError::from(StorageError::InsertFailed {
                entity: EntityKind::Attachment,
                reason: e.to_string(),
            })
        })?;
        Ok(())
    }

    async fn get_attachment(&self, id: &str) -> BanterResult<Option<Attachment>> {
        let row = sqlx::query(
            "SELECT id, scope, owner_user_id, uri, storage_path, filename, content_type, \
                    size_bytes, caption, created_at \
             FROM attachments WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.as_ref().map(row_to_attachment).transpose()
    }

    async fn list_attachments_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> BanterResult<Vec<Attachment>> {
        let rows = sqlx::query(
            "SELECT id, scope, owner_user_id, uri, storage_path, filename, content_type, \
                    size_bytes, caption, created_at \
             FROM attachments \
             WHERE scope = 'system' OR (scope = 'user' AND owner_user_id = ?1) \
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter().map(row_to_attachment).collect()
    }

    async fn set_attachment_caption(&self, id: &str, caption: &str) -> BanterResult<()> {
        let updated = sqlx::query("UPDATE attachments SET caption = ?2 WHERE id = ?1")
            .bind(id)
            .bind(caption)
            .execute(&self.pool)
            .await
            .map_err(query_err)?;
        if updated.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: EntityKind::Attachment,
                id: id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn delete_attachment(&self, id: &str) -> BanterResult<Option<Attachment>> {
        let row = sqlx::query(
            "DELETE FROM attachments WHERE id = ?1 \
             RETURNING id, scope, owner_user_id, uri, storage_path, filename, content_type, \
                       size_bytes, caption, created_at",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.as_ref().map(row_to_attachment).transpose()
    }

    async fn ping(&self) -> BanterResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn query_err(e: sqlx::Error) -> BanterError {
    StorageError::QueryFailed {
        reason: e.to_string(),
    }
    .into()
}

fn millis_to_ts(ms: i64) -> BanterResult<Timestamp> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
        StorageError::QueryFailed {
            reason: format!("timestamp out of range: {}", ms),
        }
        .into()
    })
}

fn row_to_conversation(row: &SqliteRow) -> BanterResult<Conversation> {
    Ok(Conversation {
        conversation_id: row.try_get("conversation_id").map_err(query_err)?,
        owner_user_id: row.try_get("user_id").map_err(query_err)?,
        created_at: millis_to_ts(row.try_get("created_at").map_err(query_err)?)?,
    })
}

fn row_to_message(row: &SqliteRow) -> BanterResult<Message> {
    let role: String = row.try_get("role").map_err(query_err)?;
    Ok(Message {
        id: row.try_get("id").map_err(query_err)?,
        conversation_id: row.try_get("conversation_id").map_err(query_err)?,
        user_id: row.try_get("user_id").map_err(query_err)?,
        role: MessageRole::from_db_str(&role).map_err(|e| {
            BanterError::from(StorageError::QueryFailed {
                reason: e.to_string(),
            })
        })?,
        content: row.try_get("content").map_err(query_err)?,
        created_at: millis_to_ts(row.try_get("created_at").map_err(query_err)?)?,
    })
}

fn row_to_attachment(row: &SqliteRow) -> BanterResult<Attachment> {
    let scope: String = row.try_get("scope").map_err(query_err)?;
    // Re-runs the constructor checks, so a hand-edited row that breaks the
    // scope/owner pairing surfaces as an error instead of leaking through.
    Attachment::new(
        row.try_get("id").map_err(query_err)?,
        AttachmentScope::from_db_str(&scope).map_err(|e| {
            BanterError::from(StorageError::QueryFailed {
                reason: e.to_string(),
            })
        })?,
        row.try_get("owner_user_id").map_err(query_err)?,
        row.try_get("uri").map_err(query_err)?,
        row.try_get("storage_path").map_err(query_err)?,
        row.try_get("filename").map_err(query_err)?,
        row.try_get("content_type").map_err(query_err)?,
        row.try_get("size_bytes").map_err(query_err)?,
        row.try_get("caption").map_err(query_err)?,
        millis_to_ts(row.try_get("created_at").map_err(query_err)?)?,
    )
}

// ============================================================================
// TESTS
// ============================================================================
