//! BANTER Core - Entity Types
//!
//! Pure data structures shared across the BANTER workspace. All other crates
//! depend on this. This crate contains only data types, their constructor-time
//! invariant checks, and the error families - no I/O and no business logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// IDENTIFIER TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Claim set carried by a resolved identity (decoded JWT payload or
/// synthesized from trusted proxy headers).
pub type ClaimMap = serde_json::Map<String, serde_json::Value>;

/// Generate a new opaque entity id.
///
/// Ids are UUIDv7 rendered as hyphenated lowercase strings, so they sort
/// lexicographically by creation time. They stay `String` at the API boundary
/// because clients may supply their own opaque conversation ids.
pub fn new_entity_id() -> String {
    Uuid::now_v7().to_string()
}

/// Truncate a string to at most `max_chars` characters, respecting UTF-8
/// boundaries. Used for conversation snippets and source previews.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Maximum snippet length carried by a conversation summary.
pub const SUMMARY_SNIPPET_CHARS: usize = 140;

/// Sentinel user id used when no user-bearing claim is present in a verified
/// token. A sentinel identity is still a valid identity, not a failure.
pub const UNKNOWN_USER_ID: &str = "unknown";

/// Claim names probed, in order, for a user id. First non-empty string wins.
pub const USER_ID_CLAIMS: [&str; 7] = [
    "sid",
    "sub",
    "preferred_username",
    "name",
    "email",
    "user",
    "uid",
];

// ============================================================================
// ENUMS
// ============================================================================

/// Author of a stored chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, MessageRoleParseError> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(MessageRoleParseError(s.to_string())),
        }
    }
}

/// Error parsing MessageRole from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRoleParseError(pub String);

impl std::fmt::Display for MessageRoleParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid message role: {}", self.0)
    }
}

impl std::error::Error for MessageRoleParseError {}

/// Visibility scope of an uploaded attachment.
///
/// `System` attachments are shared knowledge readable by every caller;
/// `User` attachments belong to exactly one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AttachmentScope {
    User,
    System,
}

impl AttachmentScope {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, AttachmentScopeParseError> {
        match s {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            _ => Err(AttachmentScopeParseError(s.to_string())),
        }
    }
}

/// Error parsing AttachmentScope from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentScopeParseError(pub String);

impl std::fmt::Display for AttachmentScopeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid attachment scope: {}", self.0)
    }
}

impl std::error::Error for AttachmentScopeParseError {}

/// How a request identity was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum TrustSource {
    /// Bearer token verified against the issuer's key set.
    #[serde(rename = "jwt-verified")]
    JwtVerified,
    /// Pre-validated identity headers from a trusted upstream proxy.
    #[serde(rename = "trusted-headers")]
    TrustedHeaders,
}

impl TrustSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JwtVerified => "jwt-verified",
            Self::TrustedHeaders => "trusted-headers",
        }
    }
}

/// Entity discriminator used in storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Conversation,
    Message,
    Attachment,
}

// ============================================================================
// IDENTITY
// ============================================================================

/// Resolved caller identity. Immutable once constructed; derived fresh on
/// every request and never persisted or cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub claims: ClaimMap,
    pub trust_source: TrustSource,
}

impl UserIdentity {
    /// Build an identity from verified token claims.
    ///
    /// The user id is the first non-empty string among [`USER_ID_CLAIMS`];
    /// when none matches the identity still stands, with
    /// [`UNKNOWN_USER_ID`] as a sentinel.
    pub fn from_claims(claims: ClaimMap) -> Self {
        let user_id = USER_ID_CLAIMS
            .iter()
            .find_map(|name| {
                claims
                    .get(*name)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| UNKNOWN_USER_ID.to_string());
        Self {
            user_id,
            claims,
            trust_source: TrustSource::JwtVerified,
        }
    }

    /// Synthesize an identity from trusted proxy headers.
    pub fn from_trusted_headers(
        user: &str,
        email: Option<&str>,
        preferred_username: Option<&str>,
        groups: Vec<String>,
    ) -> Self {
        let mut claims = ClaimMap::new();
        claims.insert("sub".to_string(), serde_json::Value::String(user.to_string()));
        if let Some(email) = email {
            claims.insert("email".to_string(), serde_json::Value::String(email.to_string()));
        }
        if let Some(username) = preferred_username {
            claims.insert(
                "preferred_username".to_string(),
                serde_json::Value::String(username.to_string()),
            );
        }
        claims.insert(
            "groups".to_string(),
            serde_json::Value::Array(
                groups.into_iter().map(serde_json::Value::String).collect(),
            ),
        );
        Self {
            user_id: user.to_string(),
            claims,
            trust_source: TrustSource::TrustedHeaders,
        }
    }

    /// Fetch a string claim by name, treating empty strings as absent.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Group memberships from the `groups` claim.
    ///
    /// Providers disagree on the claim shape: some issue a JSON array, some a
    /// single comma-separated string. Both are accepted.
    pub fn groups(&self) -> Vec<String> {
        match self.claims.get("groups") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(serde_json::Value::String(s)) => s
                .split(',')
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the configured admin group appears in the identity's groups.
    pub fn is_admin(&self, admin_group: &str) -> bool {
        !admin_group.is_empty() && self.groups().iter().any(|g| g == admin_group)
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// Conversation - one durable chat thread owned by a single user.
/// Created lazily on the first message of a session; never updated after
/// creation; deleted only by explicit owner action (cascading to messages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Conversation {
    pub conversation_id: String,
    pub owner_user_id: String,
    #[cfg_attr(feature = "openapi", schema(value_type = DateTime<Utc>))]
    pub created_at: Timestamp,
}

/// Message - one append-only entry in a conversation's history.
/// Ordering key is `(conversation_id, created_at)`, insertion order on ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    #[cfg_attr(feature = "openapi", schema(value_type = DateTime<Utc>))]
    pub created_at: Timestamp,
}

/// Listing row for a user's conversations, ordered by most recent activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConversationSummary {
    pub conversation_id: String,
    #[cfg_attr(feature = "openapi", schema(value_type = DateTime<Utc>))]
    pub created_at: Timestamp,
    /// Time of the latest message, falling back to `created_at` when the
    /// conversation has no messages yet.
    #[cfg_attr(feature = "openapi", schema(value_type = DateTime<Utc>))]
    pub last_message_at: Timestamp,
    pub message_count: i64,
    /// Up to [`SUMMARY_SNIPPET_CHARS`] characters of the latest message.
    pub snippet: String,
}

/// Attachment - metadata for an uploaded file held in the blob store.
///
/// Construct through [`Attachment::new`], which enforces the scope/owner
/// pairing invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Attachment {
    pub id: String,
    pub scope: AttachmentScope,
    /// Present iff `scope == User`.
    pub owner_user_id: Option<String>,
    pub uri: String,
    pub storage_path: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    /// Filled after upload by vision captioning; the row exists before the
    /// caption does.
    pub caption: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = DateTime<Utc>))]
    pub created_at: Timestamp,
}

impl Attachment {
    /// Build an attachment record, enforcing `scope=User ⇔ owner present`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        scope: AttachmentScope,
        owner_user_id: Option<String>,
        uri: String,
        storage_path: String,
        filename: String,
        content_type: Option<String>,
        size_bytes: i64,
        caption: Option<String>,
        created_at: Timestamp,
    ) -> BanterResult<Self> {
        match (scope, &owner_user_id) {
            (AttachmentScope::User, None) => {
                return Err(StorageError::InvalidRecord {
                    reason: "user-scoped attachment requires an owner".to_string(),
                }
                .into());
            }
            (AttachmentScope::System, Some(_)) => {
                return Err(StorageError::InvalidRecord {
                    reason: "system-scoped attachment must not have an owner".to_string(),
                }
                .into());
            }
            _ => {}
        }
        if size_bytes < 0 {
            return Err(StorageError::InvalidRecord {
                reason: format!("negative size_bytes: {}", size_bytes),
            }
            .into());
        }
        Ok(Self {
            id,
            scope,
            owner_user_id,
            uri,
            storage_path,
            filename,
            content_type,
            size_bytes,
            caption,
            created_at,
        })
    }

    /// Whether `user_id` owns this attachment.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_user_id.as_deref() == Some(user_id)
    }
}

/// One retrieved context passage, ordered by descending relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SourcePassage {
    /// Identifier of the originating document or collection.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Identity and authorization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Bad or missing token, unknown key, issuer mismatch, failed discovery.
    /// Maps to HTTP 401.
    #[error("Verification failed: {reason}")]
    Verification { reason: String },

    /// Authenticated caller lacks access to the resource. Maps to HTTP 403.
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },
}

impl AuthError {
    pub fn verification(reason: impl Into<String>) -> Self {
        Self::Verification { reason: reason.into() }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden { reason: reason.into() }
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Not found: {entity:?} with id {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("Insert failed for {entity:?}: {reason}")]
    InsertFailed { entity: EntityKind, reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("I/O error at {path}: {reason}")]
    Io { path: String, reason: String },
}

/// LLM and retrieval collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Stream from {provider} interrupted: {reason}")]
    StreamInterrupted { provider: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all BANTER errors.
#[derive(Debug, Clone, Error)]
pub enum BanterError {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for BANTER operations.
pub type BanterResult<T> = Result<T, BanterError>;

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
