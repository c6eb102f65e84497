//! OIDC Discovery and Key-Set Cache
//!
//! Verification key material is fetched over the network and TTL-cached:
//! discovery documents keyed by issuer, JWKS documents keyed by URL. The
//! check-then-fill runs under an async lock but the fetch itself does not,
//! so a slow issuer never blocks lookups for a different one. Concurrent
//! refetches of the same key are tolerated; the last writer wins and stale
//! data is never served past its TTL.
//!
//! The cache is constructed once at startup and injected into the identity
//! resolver. Tests substitute a fake [`KeyFetcher`] and a [`FixedClock`].

use async_trait::async_trait;
use banter_core::{AuthError, BanterResult};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default lifetime of a cached discovery document or key set.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);

/// Default timeout for a single discovery/JWKS fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// WIRE SHAPES
// ============================================================================

/// The subset of an OIDC discovery document the resolver needs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiscoveryDoc {
    pub issuer: String,
    pub jwks_uri: String,
}

/// One JSON Web Key. Fields are per-type: RSA carries `n`/`e`, EC carries
/// `x`/`y`/`crv`, symmetric keys carry `k`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub k: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeySet {
    pub keys: Vec<Jwk>,
}

impl KeySet {
    /// The key whose `kid` matches, if any.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// Build a verification key from a JWK.
pub fn decoding_key(jwk: &Jwk) -> BanterResult<DecodingKey> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk
                .n
                .as_deref()
                .ok_or_else(|| AuthError::verification("RSA JWK missing modulus"))?;
            let e = jwk
                .e
                .as_deref()
                .ok_or_else(|| AuthError::verification("RSA JWK missing exponent"))?;
            DecodingKey::from_rsa_components(n, e)
                .map_err(|e| AuthError::verification(format!("invalid RSA JWK: {}", e)).into())
        }
        "EC" => {
            let x = jwk
                .x
                .as_deref()
                .ok_or_else(|| AuthError::verification("EC JWK missing x coordinate"))?;
            let y = jwk
                .y
                .as_deref()
                .ok_or_else(|| AuthError::verification("EC JWK missing y coordinate"))?;
            DecodingKey::from_ec_components(x, y)
                .map_err(|e| AuthError::verification(format!("invalid EC JWK: {}", e)).into())
        }
        "oct" => {
            use base64::engine::general_purpose::URL_SAFE_NO_PAD;
            use base64::Engine;
            let k = jwk
                .k
                .as_deref()
                .ok_or_else(|| AuthError::verification("oct JWK missing key value"))?;
            let secret = URL_SAFE_NO_PAD
                .decode(k)
                .map_err(|e| AuthError::verification(format!("invalid oct JWK: {}", e)))?;
            Ok(DecodingKey::from_secret(&secret))
        }
        other => {
            Err(AuthError::verification(format!("unsupported JWK key type: {}", other)).into())
        }
    }
}

/// Discovery URL for an issuer, trailing slash normalized away.
pub fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

// ============================================================================
// FETCHER AND CLOCK SEAMS
// ============================================================================

/// Fetches a JSON document from a URL. The production implementation is
/// HTTP with a bounded timeout; tests substitute a fake.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> BanterResult<serde_json::Value>;
}

/// HTTP fetcher for discovery and JWKS documents.
pub struct HttpKeyFetcher {
    http: reqwest::Client,
}

impl HttpKeyFetcher {
    pub fn new(timeout: Duration) -> BanterResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::verification(format!("key fetcher init failed: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch_json(&self, url: &str) -> BanterResult<serde_json::Value> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::verification(format!("fetch of {} failed: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(
                AuthError::verification(format!("fetch of {} returned {}", url, status)).into(),
            );
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AuthError::verification(format!("fetch of {} not JSON: {}", url, e)))?;
        if !value.is_object() {
            return Err(
                AuthError::verification(format!("fetch of {} not a JSON object", url)).into(),
            );
        }
        Ok(value)
    }
}

/// Time source for cache expiry. Swappable so TTL behavior is testable
/// without sleeping.
pub trait CacheClock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock for production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCacheClock;

impl CacheClock for SystemCacheClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Clone)]
pub struct FixedClock {
    base: Instant,
    offset: Arc<std::sync::Mutex<Duration>>,
}

impl FixedClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(std::sync::Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheClock for FixedClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or(Duration::ZERO);
        self.base + offset
    }
}

// ============================================================================
// KEY CACHE
// ============================================================================

struct CachedEntry<T> {
    value: T,
    expires_at: Instant,
}

/// TTL cache over discovery documents and key sets.
pub struct KeyCache {
    fetcher: Arc<dyn KeyFetcher>,
    clock: Arc<dyn CacheClock>,
    ttl: Duration,
    /// Issuer restriction; a discovery document claiming a different issuer
    /// is rejected before it can be cached.
    expected_issuer: Option<String>,
    discovery: Mutex<HashMap<String, CachedEntry<DiscoveryDoc>>>,
    keysets: Mutex<HashMap<String, CachedEntry<KeySet>>>,
}

impl KeyCache {
    pub fn new(
        fetcher: Arc<dyn KeyFetcher>,
        clock: Arc<dyn CacheClock>,
        ttl: Duration,
        expected_issuer: Option<String>,
    ) -> Self {
        Self {
            fetcher,
            clock,
            ttl,
            expected_issuer,
            discovery: Mutex::new(HashMap::new()),
            keysets: Mutex::new(HashMap::new()),
        }
    }

    /// Discovery document for `issuer`, from cache or the network.
    pub async fn get_discovery(&self, issuer: &str) -> BanterResult<DiscoveryDoc> {
        let now = self.clock.now();
        {
            let cache = self.discovery.lock().await;
            if let Some(entry) = cache.get(issuer) {
                if entry.expires_at > now {
                    return Ok(entry.value.clone());
                }
            }
        }

        // Fetch outside the lock; a concurrent refetch is redundant work,
        // not a consistency violation.
        let url = discovery_url(issuer);
        let raw = self.fetcher.fetch_json(&url).await?;
        let doc: DiscoveryDoc = serde_json::from_value(raw)
            .map_err(|e| AuthError::verification(format!("malformed discovery document: {}", e)))?;

        if let Some(expected) = &self.expected_issuer {
            if &doc.issuer != expected {
                return Err(AuthError::verification(format!(
                    "discovery issuer mismatch: expected {}, got {}",
                    expected, doc.issuer
                ))
                .into());
            }
        }

        let mut cache = self.discovery.lock().await;
        cache.insert(
            issuer.to_string(),
            CachedEntry {
                value: doc.clone(),
                expires_at: self.clock.now() + self.ttl,
            },
        );
        Ok(doc)
    }

    /// Key set at `url`, from cache or the network.
    pub async fn get_keyset(&self, url: &str) -> BanterResult<KeySet> {
        let now = self.clock.now();
        {
            let cache = self.keysets.lock().await;
            if let Some(entry) = cache.get(url) {
                if entry.expires_at > now {
                    return Ok(entry.value.clone());
                }
            }
        }

        let raw = self.fetcher.fetch_json(url).await?;
        let keys: KeySet = serde_json::from_value(raw)
            .map_err(|e| AuthError::verification(format!("malformed key set: {}", e)))?;

        let mut cache = self.keysets.lock().await;
        cache.insert(
            url.to_string(),
            CachedEntry {
                value: keys.clone(),
                expires_at: self.clock.now() + self.ttl,
            },
        );
        Ok(keys)
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("ttl", &self.ttl)
            .field("expected_issuer", &self.expected_issuer)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
