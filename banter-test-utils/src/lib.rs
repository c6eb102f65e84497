//! BANTER Test Utilities
//!
//! Centralized test infrastructure for the BANTER workspace:
//! - Proptest generators for the core entity types
//! - Identity fixtures for authorization tests
//! - Token and JWKS builders for the verification chain

// Re-export test doubles from their source crates
pub use banter_llm::{MockChatProvider, MockIngestor, MockRetriever, MockVisionProvider};
pub use banter_storage::{MemoryFileStore, MemoryStore};

// Re-export core types for convenience
pub use banter_core::{
    Attachment, AttachmentScope, ClaimMap, Conversation, ConversationSummary, Message,
    MessageRole, SourcePassage, Timestamp, TrustSource, UserIdentity, new_entity_id,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for BANTER entity types.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    /// Generate a fresh entity id (UUIDv7 string).
    pub fn arb_entity_id() -> impl Strategy<Value = String> {
        Just(()).prop_map(|_| new_entity_id())
    }

    /// Generate a plausible user id.
    pub fn arb_user_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9._-]{2,24}"
    }

    /// Generate a timestamp within a sane range (2020..2030).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800i64..1_893_456_000i64)
            .prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
    }

    pub fn arb_message_role() -> impl Strategy<Value = MessageRole> {
        prop_oneof![Just(MessageRole::User), Just(MessageRole::Assistant)]
    }

    pub fn arb_attachment_scope() -> impl Strategy<Value = AttachmentScope> {
        prop_oneof![Just(AttachmentScope::User), Just(AttachmentScope::System)]
    }

    pub fn arb_conversation() -> impl Strategy<Value = Conversation> {
        (arb_entity_id(), arb_user_id(), arb_timestamp()).prop_map(
            |(conversation_id, owner_user_id, created_at)| Conversation {
                conversation_id,
                owner_user_id,
                created_at,
            },
        )
    }

    pub fn arb_message(conversation_id: String) -> impl Strategy<Value = Message> {
        (
            arb_entity_id(),
            arb_user_id(),
            arb_message_role(),
            ".{0,200}",
            arb_timestamp(),
        )
            .prop_map(move |(id, user_id, role, content, created_at)| Message {
                id,
                conversation_id: conversation_id.clone(),
                user_id,
                role,
                content,
                created_at,
            })
    }

    /// Generate an attachment with a scope-consistent owner.
    pub fn arb_attachment() -> impl Strategy<Value = Attachment> {
        (
            arb_entity_id(),
            arb_attachment_scope(),
            arb_user_id(),
            "[a-z0-9_]{1,20}\\.(txt|pdf|png)",
            0i64..10_000_000,
            arb_timestamp(),
        )
            .prop_map(|(id, scope, owner, filename, size_bytes, created_at)| {
                let owner_user_id = match scope {
                    AttachmentScope::User => Some(owner),
                    AttachmentScope::System => None,
                };
                let storage_path = format!("/data/uploads/{}/{}", id, filename);
                Attachment::new(
                    id,
                    scope,
                    owner_user_id,
                    format!("file://{}", storage_path),
                    storage_path,
                    filename,
                    Some("application/octet-stream".to_string()),
                    size_bytes,
                    None,
                    created_at,
                )
                .expect("generated attachment is scope-consistent")
            })
    }

    pub fn arb_source_passage() -> impl Strategy<Value = SourcePassage> {
        (
            "[a-z0-9/._-]{1,40}",
            proptest::option::of(".{1,40}"),
            ".{1,200}",
            0.0f32..1.0f32,
        )
            .prop_map(|(source, title, text, score)| SourcePassage {
                source,
                title,
                text,
                score,
                metadata: None,
            })
    }

    /// Generate a claim map that always carries a `sub`.
    pub fn arb_claims() -> impl Strategy<Value = ClaimMap> {
        (
            arb_user_id(),
            proptest::option::of("[a-z]{3,12}@[a-z]{3,12}\\.com"),
            proptest::collection::vec("[a-z-]{3,16}", 0..4),
        )
            .prop_map(|(sub, email, groups)| {
                let mut claims = ClaimMap::new();
                claims.insert("sub".to_string(), serde_json::Value::String(sub));
                if let Some(email) = email {
                    claims.insert("email".to_string(), serde_json::Value::String(email));
                }
                claims.insert(
                    "groups".to_string(),
                    serde_json::Value::Array(
                        groups.into_iter().map(serde_json::Value::String).collect(),
                    ),
                );
                claims
            })
    }

    pub fn arb_identity() -> impl Strategy<Value = UserIdentity> {
        arb_claims().prop_map(UserIdentity::from_claims)
    }
}

// ============================================================================
// IDENTITY FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built identities and attachments for authorization tests.

    use super::*;
    use chrono::Utc;

    /// Token-verified identity for `user_id` with no group memberships.
    pub fn jwt_identity(user_id: &str) -> UserIdentity {
        let mut claims = ClaimMap::new();
        claims.insert(
            "sub".to_string(),
            serde_json::Value::String(user_id.to_string()),
        );
        UserIdentity::from_claims(claims)
    }

    /// Token-verified identity for `user_id` carrying the given groups.
    pub fn jwt_identity_with_groups(user_id: &str, groups: &[&str]) -> UserIdentity {
        let mut claims = ClaimMap::new();
        claims.insert(
            "sub".to_string(),
            serde_json::Value::String(user_id.to_string()),
        );
        claims.insert(
            "groups".to_string(),
            serde_json::Value::Array(
                groups
                    .iter()
                    .map(|g| serde_json::Value::String(g.to_string()))
                    .collect(),
            ),
        );
        UserIdentity::from_claims(claims)
    }

    /// Identity synthesized from trusted proxy headers.
    pub fn trusted_identity(user_id: &str) -> UserIdentity {
        UserIdentity::from_trusted_headers(user_id, None, None, Vec::new())
    }

    /// User-scoped attachment owned by `owner`.
    pub fn user_attachment(id: &str, owner: &str) -> Attachment {
        Attachment::new(
            id.to_string(),
            AttachmentScope::User,
            Some(owner.to_string()),
            format!("file:///data/uploads/{}/{}/notes.txt", owner, id),
            format!("/data/uploads/{}/{}/notes.txt", owner, id),
            "notes.txt".to_string(),
            Some("text/plain".to_string()),
            42,
            None,
            Utc::now(),
        )
        .expect("fixture attachment is valid")
    }

    /// System-scoped attachment with no owner.
    pub fn system_attachment(id: &str) -> Attachment {
        Attachment::new(
            id.to_string(),
            AttachmentScope::System,
            None,
            format!("file:///data/uploads/_system/{}/handbook.pdf", id),
            format!("/data/uploads/_system/{}/handbook.pdf", id),
            "handbook.pdf".to_string(),
            Some("application/pdf".to_string()),
            1024,
            None,
            Utc::now(),
        )
        .expect("fixture attachment is valid")
    }
}

// ============================================================================
// TOKEN AND KEY-SET FIXTURES
// ============================================================================

pub mod tokens {
    //! Builders for signed test tokens and the JWKS documents that verify
    //! them. HS256 with symmetric `oct` keys keeps the fixtures
    //! self-contained; the verification chain treats the algorithm as data.

    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::{json, Value};

    /// Symmetric JWK carrying `secret` under key id `kid`.
    pub fn oct_jwk(kid: &str, secret: &[u8]) -> Value {
        json!({
            "kty": "oct",
            "kid": kid,
            "alg": "HS256",
            "k": URL_SAFE_NO_PAD.encode(secret),
        })
    }

    /// JWKS document wrapping the given keys.
    pub fn jwks_json(keys: Vec<Value>) -> Value {
        json!({ "keys": keys })
    }

    /// OIDC discovery document pointing at `jwks_uri`.
    pub fn discovery_json(issuer: &str, jwks_uri: &str) -> Value {
        json!({
            "issuer": issuer,
            "jwks_uri": jwks_uri,
        })
    }

    /// Mint an HS256 token over `claims`, signed with `secret` and tagged
    /// with `kid` so key selection can find the matching JWK.
    pub fn mint_hs256(kid: &str, claims: &Value, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &EncodingKey::from_secret(secret))
            .expect("HS256 signing cannot fail with a valid secret")
    }

    /// Standard claim set for `sub`, issued by `issuer`, expiring at `exp`.
    pub fn standard_claims(sub: &str, issuer: &str, exp: i64) -> Value {
        json!({
            "sub": sub,
            "iss": issuer,
            "exp": exp,
            "iat": exp - 3600,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
