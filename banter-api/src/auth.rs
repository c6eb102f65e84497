//! Identity Resolution
//!
//! Turns an inbound request into a [`UserIdentity`] through an ordered
//! strategy chain: bearer-token verification first, trusted proxy headers
//! as fallback. Each strategy yields `Some(identity)` or `None`; only
//! exhaustion of the chain produces an error. Identity is recomputed per
//! request and never cached (the key cache holds key material only).
//!
//! Token verification resolves the signing key through the OIDC key cache:
//! statically configured JWKS URL when set, else issuer-based discovery.

use crate::error::{ApiResult, ErrorCode};
use crate::oidc::{decoding_key, KeyCache};
use axum::http::HeaderMap;
use banter_core::{AuthError, BanterError, ClaimMap, ConfigError, UserIdentity};
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Serialize;
use std::time::Duration;

/// Header carrying the bearer access token.
pub const ACCESS_TOKEN_HEADER: &str = "x-auth-request-access-token";

/// Trusted-proxy identity headers, consumed only when fallback is enabled.
pub const TRUSTED_USER_HEADER: &str = "x-auth-request-user";
pub const TRUSTED_EMAIL_HEADER: &str = "x-auth-request-email";
pub const TRUSTED_USERNAME_HEADER: &str = "x-auth-request-preferred-username";
pub const TRUSTED_GROUPS_HEADERS: [&str; 2] =
    ["x-auth-request-groups", "x-auth-request-user-groups"];

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Identity resolver configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Accept pre-validated identity headers from a trusted upstream proxy.
    pub trust_proxy_headers: bool,
    /// Static JWKS URL; set, it skips issuer discovery entirely.
    pub jwks_url: Option<String>,
    /// Expected token issuer; enables issuer checks when set.
    pub issuer: Option<String>,
    /// Expected token audience; audience validation is skipped when empty.
    pub audience: Option<String>,
    /// Group name granting admin privileges.
    pub admin_group: String,
    /// Discovery/JWKS cache TTL.
    pub key_ttl: Duration,
    /// Per-fetch network timeout for key material.
    pub fetch_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            trust_proxy_headers: true,
            jwks_url: None,
            issuer: None,
            audience: Some("oauth2-proxy".to_string()),
            admin_group: "assistant-admins".to_string(),
            key_ttl: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl AuthConfig {
    /// Create AuthConfig from environment variables.
    ///
    /// Environment variables:
    /// - `BANTER_TRUST_PROXY_HEADERS`: "true" or "false" (default: true)
    /// - `BANTER_JWKS_URL`: static JWKS URL (default: unset, use discovery)
    /// - `BANTER_OIDC_ISSUER`: expected issuer (default: unset)
    /// - `BANTER_OIDC_AUDIENCE`: expected audience (default: "oauth2-proxy",
    ///   empty disables the audience check)
    /// - `BANTER_ADMIN_GROUP`: admin group name (default: "assistant-admins")
    /// - `BANTER_KEY_TTL_SECS`: key cache TTL (default: 3600)
    /// - `BANTER_KEY_FETCH_TIMEOUT_SECS`: key fetch timeout (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let trust_proxy_headers = std::env::var("BANTER_TRUST_PROXY_HEADERS")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.trust_proxy_headers);

        let jwks_url = std::env::var("BANTER_JWKS_URL")
            .ok()
            .filter(|s| !s.is_empty());

        let issuer = std::env::var("BANTER_OIDC_ISSUER")
            .ok()
            .filter(|s| !s.is_empty());

        let audience = match std::env::var("BANTER_OIDC_AUDIENCE") {
            Ok(s) if s.is_empty() => None,
            Ok(s) => Some(s),
            Err(_) => defaults.audience,
        };

        let admin_group =
            std::env::var("BANTER_ADMIN_GROUP").unwrap_or(defaults.admin_group);

        let key_ttl = std::env::var("BANTER_KEY_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.key_ttl);

        let fetch_timeout = std::env::var("BANTER_KEY_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.fetch_timeout);

        Self {
            trust_proxy_headers,
            jwks_url,
            issuer,
            audience,
            admin_group,
            key_ttl,
            fetch_timeout,
        }
    }

    /// Reject configurations that cannot authenticate anyone: header trust
    /// disabled with no verification source leaves every request a 401.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if !self.trust_proxy_headers && self.jwks_url.is_none() && self.issuer.is_none() {
            return Err(ConfigError::MissingRequired {
                field: "BANTER_JWKS_URL or BANTER_OIDC_ISSUER".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// IDENTITY RESOLVER
// ============================================================================

/// Per-request identity resolution over the configured strategy chain.
pub struct IdentityResolver {
    config: AuthConfig,
    keys: KeyCache,
}

impl IdentityResolver {
    pub fn new(config: AuthConfig, keys: KeyCache) -> Self {
        Self { config, keys }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Resolve the caller identity from request headers.
    ///
    /// A verification failure on the bearer path falls through to the
    /// trusted-header strategy when enabled; the original error is kept and
    /// surfaced if no later strategy yields an identity.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<UserIdentity, AuthError> {
        let mut last_error = None;

        match self.resolve_bearer(headers).await {
            Ok(Some(identity)) => return Ok(identity),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "bearer token verification failed");
                last_error = Some(e);
            }
        }

        if self.config.trust_proxy_headers {
            if let Some(identity) = resolve_trusted_headers(headers) {
                return Ok(identity);
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AuthError::verification("No user identity found (missing headers/JWT)")
        }))
    }

    /// The bearer-token strategy. `Ok(None)` means no token was presented.
    async fn resolve_bearer(&self, headers: &HeaderMap) -> Result<Option<UserIdentity>, AuthError> {
        let Some(token) = header_str(headers, ACCESS_TOKEN_HEADER) else {
            return Ok(None);
        };

        let header = decode_header(token)
            .map_err(|e| AuthError::verification(format!("malformed token header: {}", e)))?;
        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| AuthError::verification("token header missing kid"))?;

        let unverified = unverified_claims(token)?;
        let token_issuer = unverified
            .get("iss")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuthError::verification("token missing iss claim"))?;

        if let Some(expected) = &self.config.issuer {
            if token_issuer != expected {
                return Err(AuthError::verification(format!(
                    "token issuer mismatch: expected {}, got {}",
                    expected, token_issuer
                )));
            }
        }

        let jwks_url = match &self.config.jwks_url {
            Some(url) => url.clone(),
            None => {
                self.keys
                    .get_discovery(token_issuer)
                    .await
                    .map_err(auth_reason)?
                    .jwks_uri
            }
        };

        let keyset = self.keys.get_keyset(&jwks_url).await.map_err(auth_reason)?;
        let jwk = keyset
            .find(kid)
            .ok_or_else(|| AuthError::verification(format!("No matching JWK for kid {}", kid)))?;
        let key = decoding_key(jwk).map_err(auth_reason)?;

        let mut validation = Validation::new(header.alg);
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let data = decode::<ClaimMap>(token, &key, &validation)
            .map_err(|e| AuthError::verification(format!("token verification failed: {}", e)))?;

        Ok(Some(UserIdentity::from_claims(data.claims)))
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("config", &self.config)
            .finish()
    }
}

/// The trusted-header strategy. The user header is the primary identity
/// source; a proxy that forwards only the email header still authenticates,
/// with the email standing in as the user id.
fn resolve_trusted_headers(headers: &HeaderMap) -> Option<UserIdentity> {
    let email = header_str(headers, TRUSTED_EMAIL_HEADER);
    let user = header_str(headers, TRUSTED_USER_HEADER).or(email)?;
    let username = header_str(headers, TRUSTED_USERNAME_HEADER);
    let groups = TRUSTED_GROUPS_HEADERS
        .iter()
        .find_map(|name| header_str(headers, name))
        .map(|raw| {
            raw.split(',')
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Some(UserIdentity::from_trusted_headers(
        user, email, username, groups,
    ))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

/// Decode the payload segment without verifying the signature; only used
/// to learn `iss` before the key is known.
fn unverified_claims(token: &str) -> Result<serde_json::Value, AuthError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::verification("malformed token"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::verification(format!("malformed token payload: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::verification(format!("malformed token claims: {}", e)))
}

fn auth_reason(err: BanterError) -> AuthError {
    match err {
        BanterError::Auth(e) => e,
        other => AuthError::verification(other.to_string()),
    }
}

// ============================================================================
// USER PROFILE PROJECTION
// ============================================================================

/// Caller profile returned by `GET /user`, derived from identity claims.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserInfo {
    pub user_id: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub groups: Vec<String>,
    pub is_admin: bool,
}

impl UserInfo {
    pub fn from_identity(identity: &UserIdentity, admin_group: &str) -> Self {
        let username = identity
            .claim_str("preferred_username")
            .or_else(|| identity.claim_str("email"))
            .or_else(|| identity.claim_str("sub"))
            .map(str::to_string);

        let first_name = identity.claim_str("given_name").map(str::to_string);
        let last_name = identity.claim_str("family_name").map(str::to_string);
        let full_name = identity
            .claim_str("name")
            .map(str::to_string)
            .or_else(|| match (&first_name, &last_name) {
                (None, None) => None,
                (first, last) => Some(
                    [first.as_deref(), last.as_deref()]
                        .iter()
                        .flatten()
                        .copied()
                        .collect::<Vec<_>>()
                        .join(" "),
                ),
            });

        Self {
            user_id: identity.user_id.clone(),
            username,
            full_name,
            first_name,
            last_name,
            email: identity.claim_str("email").map(str::to_string),
            groups: identity.groups(),
            is_admin: identity.is_admin(admin_group),
        }
    }
}

/// Admin gate shared by routes that require elevated access.
pub fn require_admin(identity: &UserIdentity, admin_group: &str) -> ApiResult<()> {
    if identity.is_admin(admin_group) {
        Ok(())
    } else {
        Err(crate::error::ApiError::new(
            ErrorCode::Forbidden,
            "Admin only",
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oidc::{FixedClock, KeyFetcher};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use banter_core::{BanterResult, TrustSource};
    use banter_test_utils::tokens;
    use once_cell::sync::Lazy;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    // Env-var tests share the process environment; serialize them.
    static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    struct EnvVarGuard {
        name: String,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(name: &str, value: &str) -> Self {
            let previous = std::env::var(name).ok();
            std::env::set_var(name, value);
            Self {
                name: name.to_string(),
                previous,
            }
        }

        fn unset(name: &str) -> Self {
            let previous = std::env::var(name).ok();
            std::env::remove_var(name);
            Self {
                name: name.to_string(),
                previous,
            }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => std::env::set_var(&self.name, value),
                None => std::env::remove_var(&self.name),
            }
        }
    }

    struct StaticFetcher {
        responses: HashMap<String, serde_json::Value>,
    }

    #[async_trait]
    impl KeyFetcher for StaticFetcher {
        async fn fetch_json(&self, url: &str) -> BanterResult<serde_json::Value> {
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| AuthError::verification(format!("no response for {}", url)).into())
        }
    }

    const ISSUER: &str = "https://sso.test";
    const JWKS_URL: &str = "https://sso.test/jwks";
    const SECRET: &[u8] = b"resolver-test-secret";
    const KID: &str = "test-key";
    const FAR_FUTURE: i64 = 4_000_000_000;

    fn resolver(config: AuthConfig, responses: Vec<(&str, serde_json::Value)>) -> IdentityResolver {
        let fetcher = Arc::new(StaticFetcher {
            responses: responses
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        });
        let keys = KeyCache::new(
            fetcher,
            Arc::new(FixedClock::new()),
            config.key_ttl,
            config.issuer.clone(),
        );
        IdentityResolver::new(config, keys)
    }

    fn jwks_config() -> AuthConfig {
        AuthConfig {
            trust_proxy_headers: false,
            jwks_url: Some(JWKS_URL.to_string()),
            issuer: Some(ISSUER.to_string()),
            audience: None,
            ..AuthConfig::default()
        }
    }

    fn jwks_responses() -> Vec<(&'static str, serde_json::Value)> {
        vec![(
            JWKS_URL,
            tokens::jwks_json(vec![tokens::oct_jwk(KID, SECRET)]),
        )]
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCESS_TOKEN_HEADER,
            HeaderValue::from_str(token).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_valid_token_resolves_verified_identity() {
        let resolver = resolver(jwks_config(), jwks_responses());
        let claims = tokens::standard_claims("alice", ISSUER, FAR_FUTURE);
        let token = tokens::mint_hs256(KID, &claims, SECRET);

        let identity = resolver.resolve(&bearer_headers(&token)).await.unwrap();
        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.trust_source, TrustSource::JwtVerified);
    }

    #[tokio::test]
    async fn test_unknown_kid_is_verification_error() {
        let resolver = resolver(jwks_config(), jwks_responses());
        let claims = tokens::standard_claims("alice", ISSUER, FAR_FUTURE);
        let token = tokens::mint_hs256("other-key", &claims, SECRET);

        let err = resolver.resolve(&bearer_headers(&token)).await.unwrap_err();
        assert!(err.to_string().contains("No matching JWK"));
    }

    #[tokio::test]
    async fn test_wrong_signature_rejected() {
        let resolver = resolver(jwks_config(), jwks_responses());
        let claims = tokens::standard_claims("alice", ISSUER, FAR_FUTURE);
        let token = tokens::mint_hs256(KID, &claims, b"some-other-secret");

        let err = resolver.resolve(&bearer_headers(&token)).await.unwrap_err();
        assert!(err.to_string().contains("verification failed"));
    }

    #[tokio::test]
    async fn test_issuer_mismatch_rejected_before_key_fetch() {
        let resolver = resolver(jwks_config(), vec![]);
        let claims = tokens::standard_claims("alice", "https://rogue.test", FAR_FUTURE);
        let token = tokens::mint_hs256(KID, &claims, SECRET);

        let err = resolver.resolve(&bearer_headers(&token)).await.unwrap_err();
        assert!(err.to_string().contains("issuer mismatch"));
    }

    #[tokio::test]
    async fn test_discovery_path_finds_jwks() {
        let config = AuthConfig {
            trust_proxy_headers: false,
            jwks_url: None,
            issuer: Some(ISSUER.to_string()),
            audience: None,
            ..AuthConfig::default()
        };
        let resolver = resolver(
            config,
            vec![
                (
                    "https://sso.test/.well-known/openid-configuration",
                    tokens::discovery_json(ISSUER, JWKS_URL),
                ),
                (
                    JWKS_URL,
                    tokens::jwks_json(vec![tokens::oct_jwk(KID, SECRET)]),
                ),
            ],
        );
        let claims = tokens::standard_claims("bob", ISSUER, FAR_FUTURE);
        let token = tokens::mint_hs256(KID, &claims, SECRET);

        let identity = resolver.resolve(&bearer_headers(&token)).await.unwrap();
        assert_eq!(identity.user_id, "bob");
    }

    #[tokio::test]
    async fn test_failed_verification_falls_back_to_trusted_headers() {
        let config = AuthConfig {
            trust_proxy_headers: true,
            ..jwks_config()
        };
        let resolver = resolver(config, jwks_responses());
        let claims = tokens::standard_claims("alice", ISSUER, FAR_FUTURE);
        let token = tokens::mint_hs256(KID, &claims, b"wrong-secret");

        let mut headers = bearer_headers(&token);
        headers.insert(TRUSTED_USER_HEADER, HeaderValue::from_static("carol"));
        headers.insert(
            "x-auth-request-groups",
            HeaderValue::from_static("staff, assistant-admins"),
        );

        let identity = resolver.resolve(&headers).await.unwrap();
        assert_eq!(identity.user_id, "carol");
        assert_eq!(identity.trust_source, TrustSource::TrustedHeaders);
        assert!(identity.is_admin("assistant-admins"));
    }

    #[tokio::test]
    async fn test_failed_verification_without_fallback_surfaces_error() {
        let resolver = resolver(jwks_config(), jwks_responses());
        let claims = tokens::standard_claims("alice", ISSUER, FAR_FUTURE);
        let token = tokens::mint_hs256(KID, &claims, b"wrong-secret");

        let mut headers = bearer_headers(&token);
        // Headers present but fallback disabled in config.
        headers.insert(TRUSTED_USER_HEADER, HeaderValue::from_static("carol"));

        assert!(resolver.resolve(&headers).await.is_err());
    }

    #[tokio::test]
    async fn test_no_token_no_headers_is_no_identity() {
        let config = AuthConfig {
            trust_proxy_headers: true,
            ..jwks_config()
        };
        let resolver = resolver(config, vec![]);
        let err = resolver.resolve(&HeaderMap::new()).await.unwrap_err();
        assert!(err.to_string().contains("No user identity found"));
    }

    #[test]
    fn test_trusted_headers_email_only_still_authenticates() {
        let mut headers = HeaderMap::new();
        headers.insert(
            TRUSTED_EMAIL_HEADER,
            HeaderValue::from_static("carol@example.com"),
        );
        let identity = resolve_trusted_headers(&headers).unwrap();
        assert_eq!(identity.user_id, "carol@example.com");
        assert_eq!(identity.claim_str("email"), Some("carol@example.com"));
    }

    #[test]
    fn test_trusted_headers_user_header_wins_over_email() {
        let mut headers = HeaderMap::new();
        headers.insert(TRUSTED_USER_HEADER, HeaderValue::from_static("carol"));
        headers.insert(
            TRUSTED_EMAIL_HEADER,
            HeaderValue::from_static("carol@example.com"),
        );
        let identity = resolve_trusted_headers(&headers).unwrap();
        assert_eq!(identity.user_id, "carol");
        assert_eq!(identity.claim_str("email"), Some("carol@example.com"));
    }

    #[test]
    fn test_trusted_headers_alternate_groups_header() {
        let mut headers = HeaderMap::new();
        headers.insert(TRUSTED_USER_HEADER, HeaderValue::from_static("dave"));
        headers.insert(
            "x-auth-request-user-groups",
            HeaderValue::from_static("engineering"),
        );
        let identity = resolve_trusted_headers(&headers).unwrap();
        assert_eq!(identity.groups(), vec!["engineering"]);
    }

    #[test]
    fn test_user_info_projection() {
        let mut claims = ClaimMap::new();
        claims.insert("sub".into(), serde_json::json!("u-1"));
        claims.insert("preferred_username".into(), serde_json::json!("alice"));
        claims.insert("email".into(), serde_json::json!("alice@example.com"));
        claims.insert("given_name".into(), serde_json::json!("Alice"));
        claims.insert("family_name".into(), serde_json::json!("Smith"));
        claims.insert("groups".into(), serde_json::json!(["assistant-admins"]));
        let identity = UserIdentity::from_claims(claims);

        let info = UserInfo::from_identity(&identity, "assistant-admins");
        assert_eq!(info.username.as_deref(), Some("alice"));
        assert_eq!(info.full_name.as_deref(), Some("Alice Smith"));
        assert_eq!(info.email.as_deref(), Some("alice@example.com"));
        assert!(info.is_admin);
    }

    #[test]
    fn test_user_info_username_fallback_order() {
        let mut claims = ClaimMap::new();
        claims.insert("sub".into(), serde_json::json!("u-2"));
        claims.insert("email".into(), serde_json::json!("bob@example.com"));
        let identity = UserIdentity::from_claims(claims);

        let info = UserInfo::from_identity(&identity, "assistant-admins");
        assert_eq!(info.username.as_deref(), Some("bob@example.com"));
        assert_eq!(info.full_name, None);
        assert!(!info.is_admin);
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guards = [
            EnvVarGuard::unset("BANTER_TRUST_PROXY_HEADERS"),
            EnvVarGuard::unset("BANTER_JWKS_URL"),
            EnvVarGuard::unset("BANTER_OIDC_ISSUER"),
            EnvVarGuard::unset("BANTER_OIDC_AUDIENCE"),
            EnvVarGuard::unset("BANTER_ADMIN_GROUP"),
            EnvVarGuard::unset("BANTER_KEY_TTL_SECS"),
        ];

        let config = AuthConfig::from_env();
        assert!(config.trust_proxy_headers);
        assert_eq!(config.jwks_url, None);
        assert_eq!(config.audience.as_deref(), Some("oauth2-proxy"));
        assert_eq!(config.admin_group, "assistant-admins");
        assert_eq!(config.key_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guards = [
            EnvVarGuard::set("BANTER_TRUST_PROXY_HEADERS", "false"),
            EnvVarGuard::set("BANTER_JWKS_URL", "https://sso.test/jwks"),
            EnvVarGuard::set("BANTER_OIDC_AUDIENCE", ""),
            EnvVarGuard::set("BANTER_KEY_TTL_SECS", "60"),
        ];

        let config = AuthConfig::from_env();
        assert!(!config.trust_proxy_headers);
        assert_eq!(config.jwks_url.as_deref(), Some("https://sso.test/jwks"));
        // Empty audience disables the check entirely.
        assert_eq!(config.audience, None);
        assert_eq!(config.key_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_production_validation() {
        let config = AuthConfig {
            trust_proxy_headers: false,
            jwks_url: None,
            issuer: None,
            ..AuthConfig::default()
        };
        assert!(config.validate_for_production().is_err());

        let config = AuthConfig {
            trust_proxy_headers: false,
            jwks_url: Some("https://sso.test/jwks".to_string()),
            ..AuthConfig::default()
        };
        assert!(config.validate_for_production().is_ok());

        assert!(AuthConfig::default().validate_for_production().is_ok());
    }
}
