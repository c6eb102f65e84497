//! BANTER Storage - Conversation & Attachment Persistence
//!
//! Defines the [`ChatStore`] trait that the session pipeline talks to, plus
//! an in-memory implementation used by tests and local development. The
//! durable SQLite implementation lives in [`sqlite`]; the blob store for
//! uploaded files lives in [`files`].
//!
//! The stores own their rows exclusively: the pipeline never mutates
//! persistent state except through these operations, which is what lets the
//! append-only and scope/owner invariants be enforced in one place.

pub mod files;
pub mod sqlite;

use async_trait::async_trait;
use banter_core::{
    truncate_chars, Attachment, AttachmentScope, BanterResult, Conversation,
    ConversationSummary, EntityKind, Message, MessageRole, StorageError, Timestamp,
    SUMMARY_SNIPPET_CHARS,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub use files::{FileStore, LocalFileStore, MemoryFileStore, StoredFile};
pub use sqlite::SqliteStore;

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Durable conversation, message, and attachment storage.
///
/// Implementations serialize multi-statement operations so interleaved
/// writers can never observe partial state (the in-memory store holds one
/// coarse lock per operation; SQLite relies on its single-writer WAL plus
/// transactions for the delete cascade).
#[async_trait]
pub trait ChatStore: Send + Sync {
    // === Conversation Operations ===

    /// Return the caller's conversation with the given id, creating it if
    /// absent. A client-supplied id is a resume hint: an unknown id creates
    /// a conversation under that id rather than erroring. `None` generates
    /// a fresh id.
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> BanterResult<Conversation>;

    /// Append one message. Pure insert, no dedup. The stored `created_at`
    /// is clamped so it never decreases within a conversation.
    async fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> BanterResult<Message>;

    /// Messages of an owned conversation, ascending by `created_at`,
    /// insertion order on ties. An unknown or foreign id yields an empty
    /// list (queries are always owner-scoped).
    async fn list_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: i64,
    ) -> BanterResult<Vec<Message>>;

    /// The caller's conversations ordered by most recent activity (last
    /// message time, else creation time) descending, with message counts
    /// and a snippet of the latest message.
    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> BanterResult<Vec<ConversationSummary>>;

    /// Delete an owned conversation and all its messages (messages first).
    /// Returns false when the conversation does not exist for this user.
    async fn delete_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> BanterResult<bool>;

    // === Attachment Operations ===

    /// Record attachment metadata. The record's invariants were already
    /// checked by [`Attachment::new`].
    async fn record_attachment(&self, attachment: &Attachment) -> BanterResult<()>;

    /// Fetch by id regardless of scope or owner. Authorization is the
    /// caller's job; the store only answers what exists.
    async fn get_attachment(&self, id: &str) -> BanterResult<Option<Attachment>>;

    /// System-scope rows plus user-scope rows owned by the caller, newest
    /// first.
    async fn list_attachments_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> BanterResult<Vec<Attachment>>;

    /// Fill the caption of an existing attachment (post-upload vision
    /// description).
    async fn set_attachment_caption(&self, id: &str, caption: &str) -> BanterResult<()>;

    /// Physically delete the row, returning the prior state so the caller
    /// can clean up the backing blob.
    async fn delete_attachment(&self, id: &str) -> BanterResult<Option<Attachment>>;

    // === Health ===

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> BanterResult<()>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory [`ChatStore`] for tests and local development.
///
/// Messages live in one insertion-ordered log, which is what makes the
/// tie-break on equal timestamps exact.
#[derive(Clone, Default)]
pub struct MemoryStore {
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
    messages: Arc<RwLock<Vec<Message>>>,
    attachments: Arc<RwLock<HashMap<String, Attachment>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_clamped(existing: Option<Timestamp>) -> Timestamp {
        let now = Utc::now();
        match existing {
            Some(latest) if latest > now => latest,
            _ => now,
        }
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> BanterResult<Conversation> {
        let mut conversations = self
            .conversations
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;

        if let Some(id) = conversation_id {
            if let Some(existing) = conversations.get(id) {
                if existing.owner_user_id == user_id {
                    return Ok(existing.clone());
                }
                return Err(StorageError::InsertFailed {
                    entity: EntityKind::Conversation,
                    reason: "conversation id exists under a different owner".to_string(),
                }
                .into());
            }
        }

        let conversation = Conversation {
            conversation_id: conversation_id
                .map(str::to_string)
                .unwrap_or_else(banter_core::new_entity_id),
            owner_user_id: user_id.to_string(),
            created_at: Utc::now(),
        };
        conversations.insert(conversation.conversation_id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> BanterResult<Message> {
        let mut messages = self
            .messages
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;

        let latest = messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.created_at)
            .max();
        let message = Message {
            id: banter_core::new_entity_id(),
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Self::now_clamped(latest),
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: i64,
    ) -> BanterResult<Vec<Message>> {
        let messages = self
            .messages
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;

        // The log is insertion-ordered, so a stable sort keeps ties in
        // insertion order.
        let mut selected: Vec<Message> = messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.user_id == user_id)
            .cloned()
            .collect();
        selected.sort_by_key(|m| m.created_at);
        selected.truncate(limit.max(0) as usize);
        Ok(selected)
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> BanterResult<Vec<ConversationSummary>> {
        let conversations = self
            .conversations
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let messages = self
            .messages
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;

        let mut summaries: Vec<ConversationSummary> = conversations
            .values()
            .filter(|c| c.owner_user_id == user_id)
            .map(|c| {
                let in_conversation: Vec<&Message> = messages
                    .iter()
                    .filter(|m| m.conversation_id == c.conversation_id)
                    .collect();
                let last_message_at = in_conversation
                    .iter()
                    .map(|m| m.created_at)
                    .max()
                    .unwrap_or(c.created_at);
                // Latest message = max timestamp, newest insertion on ties.
                let snippet = in_conversation
                    .iter()
                    .rev()
                    .find(|m| m.created_at == last_message_at)
                    .map(|m| truncate_chars(&m.content, SUMMARY_SNIPPET_CHARS))
                    .unwrap_or_default();
                ConversationSummary {
                    conversation_id: c.conversation_id.clone(),
                    created_at: c.created_at,
                    last_message_at,
                    message_count: in_conversation.len() as i64,
                    snippet,
                }
            })
            .collect();

        summaries.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then(b.conversation_id.cmp(&a.conversation_id))
        });
        let start = (offset.max(0) as usize).min(summaries.len());
        let end = (start + limit.max(0) as usize).min(summaries.len());
        Ok(summaries[start..end].to_vec())
    }

    async fn delete_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> BanterResult<bool> {
        let mut conversations = self
            .conversations
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut messages = self
            .messages
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;

        let owned = conversations
            .get(conversation_id)
            .map(|c| c.owner_user_id == user_id)
            .unwrap_or(false);
        if !owned {
            return Ok(false);
        }

        // Messages before parent, mirroring referential integrity order.
        messages.retain(|m| m.conversation_id != conversation_id);
        conversations.remove(conversation_id);
        Ok(true)
    }

    async fn record_attachment(&self, attachment: &Attachment) -> BanterResult<()> {
        let mut attachments = self
            .attachments
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if attachments.contains_key(&attachment.id) {
            return Err(StorageError::InsertFailed {
                entity: EntityKind::Attachment,
                reason: "already exists".to_string(),
            }
            .into());
        }
        attachments.insert(attachment.id.clone(), attachment.clone());
        Ok(())
    }

    async fn get_attachment(&self, id: &str) -> BanterResult<Option<Attachment>> {
        let attachments = self
            .attachments
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(attachments.get(id).cloned())
    }

    async fn list_attachments_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> BanterResult<Vec<Attachment>> {
        let attachments = self
            .attachments
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;

        let mut visible: Vec<Attachment> = attachments
            .values()
            .filter(|a| a.scope == AttachmentScope::System || a.is_owned_by(user_id))
            .cloned()
            .collect();
        visible.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.id.cmp(&a.id))
        });
        visible.truncate(limit.max(0) as usize);
        Ok(visible)
    }

    async fn set_attachment_caption(&self, id: &str, caption: &str) -> BanterResult<()> {
        let mut attachments = self
            .attachments
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let attachment = attachments.get_mut(id).ok_or(StorageError::NotFound {
            entity: EntityKind::Attachment,
            id: id.to_string(),
        })?;
        attachment.caption = Some(caption.to_string());
        Ok(())
    }

    async fn delete_attachment(&self, id: &str) -> BanterResult<Option<Attachment>> {
        let mut attachments = self
            .attachments
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(attachments.remove(id))
    }

    async fn ping(&self) -> BanterResult<()> {
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Appended messages always come back in order, whatever the batch.
        #[test]
        fn prop_messages_round_trip_in_order(contents in proptest::collection::vec(".{0,40}", 1..20)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let store = MemoryStore::new();
                let conversation = store
                    .get_or_create_conversation("alice", None)
                    .await
                    .unwrap();
                for content in &contents {
                    store
                        .append_message("alice", &conversation.conversation_id, MessageRole::User, content)
                        .await
                        .unwrap();
                }
                let listed = store
                    .list_messages("alice", &conversation.conversation_id, contents.len() as i64)
                    .await
                    .unwrap();
                let listed_contents: Vec<String> =
                    listed.iter().map(|m| m.content.clone()).collect();
                assert_eq!(listed_contents, contents);
            });
        }

        /// A foreign user-scope attachment is never listed.
        #[test]
        fn prop_foreign_attachments_invisible(owners in proptest::collection::vec("[a-c]", 1..12)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let store = MemoryStore::new();
                for owner in &owners {
                    let attachment = Attachment::new(
                        banter_core::new_entity_id(),
                        AttachmentScope::User,
                        Some(owner.clone()),
                        "file:///tmp/p".to_string(),
                        "/tmp/p".to_string(),
                        "p.txt".to_string(),
                        None,
                        1,
                        None,
                        Utc::now(),
                    )
                    .unwrap();
                    store.record_attachment(&attachment).await.unwrap();
                }
                let visible = store.list_attachments_for_user("a", 100).await.unwrap();
                assert!(visible.iter().all(|a| a.is_owned_by("a")));
                let expected = owners.iter().filter(|o| o.as_str() == "a").count();
                assert_eq!(visible.len(), expected);
            });
        }
    }
}
