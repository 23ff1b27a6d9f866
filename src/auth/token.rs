//! Signed, time-limited BWS access tokens
//!
//! BWS authenticates every call with an HS512 JWT whose issuer and subject
//! are the client id and whose audience is `BWS`. Tokens are cached and
//! re-signed shortly before they expire.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::{debug, info};

use crate::error::BwsError;

/// Audience every BWS token must carry.
pub const BWS_AUDIENCE: &str = "BWS";

/// Tokens are renewed once less than this much lifetime remains.
pub const RENEWAL_BUFFER_MINUTES: i64 = 5;

/// Minimum HMAC-SHA512 key length; shorter keys are stretched with SHA-512.
const MIN_KEY_BYTES: usize = 64;

/// Claims carried by a BWS access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BwsClaims {
    /// Issuer (client id)
    pub iss: String,
    /// Subject (client id)
    pub sub: String,
    /// Audience
    pub aud: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + ChronoDuration::minutes(RENEWAL_BUFFER_MINUTES)
    }
}

/// Issues and caches BWS access tokens.
pub struct BwsTokenProvider {
    client_id: String,
    key: EncodingKey,
    expire_minutes: u32,
    cached: ArcSwapOption<CachedToken>,
}

impl BwsTokenProvider {
    /// Creates a provider from the client id and the base64 secret issued by the BWS portal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the client id or key is empty, the key is
    /// not valid base64, or `expire_minutes` does not exceed
    /// [`RENEWAL_BUFFER_MINUTES`].
    pub fn new(client_id: &str, secret_key: &str, expire_minutes: u32) -> Result<Self, BwsError> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(BwsError::invalid_config("client id cannot be empty"));
        }
        if i64::from(expire_minutes) <= RENEWAL_BUFFER_MINUTES {
            return Err(BwsError::invalid_config(format!(
                "token expiry must exceed the {RENEWAL_BUFFER_MINUTES} minute renewal buffer"
            )));
        }

        let key_bytes = derive_signing_key(secret_key)?;

        debug!(client_id = %client_id, "Initialized BWS token provider");

        Ok(Self {
            client_id: client_id.to_string(),
            key: EncodingKey::from_secret(&key_bytes),
            expire_minutes,
            cached: ArcSwapOption::empty(),
        })
    }

    /// Returns a valid token, signing a new one when the cached token is near expiry.
    ///
    /// # Errors
    ///
    /// Returns a system error if signing fails.
    pub fn token(&self) -> Result<String, BwsError> {
        let now = Utc::now();
        if let Some(cached) = self.cached.load().as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.token.clone());
            }
        }

        let expires_at = now + ChronoDuration::minutes(i64::from(self.expire_minutes));
        let claims = BwsClaims {
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            aud: BWS_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.key)
            .map_err(|e| BwsError::system(format!("failed to sign BWS token: {e}")))?;

        // Concurrent renewals race harmlessly; each stored token is valid.
        self.cached.store(Some(Arc::new(CachedToken {
            token: token.clone(),
            expires_at,
        })));

        info!(
            client_id = %self.client_id,
            expires_at = %expires_at,
            "Signed new BWS access token"
        );

        Ok(token)
    }

    /// Forces the next call to [`token`](Self::token) to sign a fresh token.
    pub fn invalidate(&self) {
        self.cached.store(None);
        debug!(client_id = %self.client_id, "Invalidated cached BWS token");
    }

    /// Client id the tokens are issued for.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Token lifetime in minutes.
    #[must_use]
    pub const fn expire_minutes(&self) -> u32 {
        self.expire_minutes
    }
}

impl fmt::Debug for BwsTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BwsTokenProvider")
            .field("client_id", &self.client_id)
            .field("expire_minutes", &self.expire_minutes)
            .finish_non_exhaustive()
    }
}

/// Decodes the portal-issued base64 key and stretches short keys to 64 bytes.
///
/// # Errors
///
/// Returns `InvalidConfig` for empty or non-base64 keys.
pub fn derive_signing_key(secret_key: &str) -> Result<Vec<u8>, BwsError> {
    let trimmed = secret_key.trim();
    if trimmed.is_empty() {
        return Err(BwsError::invalid_config("secret key cannot be empty"));
    }

    let bytes = STANDARD.decode(trimmed).map_err(|_| {
        BwsError::invalid_config("secret key must be base64 encoded as issued by the BWS portal")
    })?;

    if bytes.len() < MIN_KEY_BYTES {
        debug!(
            key_len = bytes.len(),
            "Stretching BWS key with SHA-512 for HS512 signing"
        );
        return Ok(Sha512::digest(&bytes).to_vec());
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    const SHORT_KEY: &str = "c2hvcnQtYndzLWtleS0yNGJ5dGVz"; // 21 bytes decoded
    const LONG_KEY: &str = "dGVzdC1zZWNyZXQta2V5LWZvci1qd3Qtc2lnbmluZy1tdXN0LWJlLWxvbmctZW5vdWdoLWZvci10ZXN0aW5nLXB1cnBvc2VzLW9ubHk=";

    fn decode_claims(token: &str, secret: &str) -> BwsClaims {
        let key = derive_signing_key(secret).unwrap();
        let mut validation = Validation::new(Algorithm::HS512);
        validation.set_audience(&[BWS_AUDIENCE]);
        validation.set_issuer(&["client-42"]);
        decode::<BwsClaims>(token, &DecodingKey::from_secret(&key), &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn test_rejects_invalid_construction() {
        assert!(BwsTokenProvider::new("", LONG_KEY, 60).is_err());
        assert!(BwsTokenProvider::new("client", "", 60).is_err());
        assert!(BwsTokenProvider::new("client", LONG_KEY, 0).is_err());
        assert!(BwsTokenProvider::new("client", "not base64 !!", 60).is_err());
    }

    #[test]
    fn test_short_keys_are_stretched() {
        assert_eq!(derive_signing_key(SHORT_KEY).unwrap().len(), 64);
        assert!(derive_signing_key(LONG_KEY).unwrap().len() >= 64);
    }

    #[test]
    fn test_token_claims() {
        let provider = BwsTokenProvider::new("client-42", SHORT_KEY, 60).unwrap();
        let token = provider.token().unwrap();
        let claims = decode_claims(&token, SHORT_KEY);

        assert_eq!(claims.iss, "client-42");
        assert_eq!(claims.sub, "client-42");
        assert_eq!(claims.aud, "BWS");
        assert_eq!(claims.exp - claims.iat, 60 * 60);
    }

    #[test]
    fn test_token_is_cached() {
        let provider = BwsTokenProvider::new("client-42", LONG_KEY, 60).unwrap();
        let first = provider.token().unwrap();
        let second = provider.token().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_lifetime_inside_renewal_buffer_rejected() {
        for minutes in [0, 1, 5] {
            let err = BwsTokenProvider::new("client-42", LONG_KEY, minutes).unwrap_err();
            assert!(matches!(err, BwsError::InvalidConfig { .. }), "{minutes}");
        }
    }

    #[test]
    fn test_shortest_lifetime_is_cached() {
        let provider = BwsTokenProvider::new("client-42", LONG_KEY, 6).unwrap();
        let first = provider.token().unwrap();
        let cached = provider.cached.load();
        assert!(cached.as_ref().unwrap().is_fresh(Utc::now()));
        assert_eq!(provider.token().unwrap(), first);
    }

    #[test]
    fn test_invalidate_clears_cache() {
        let provider = BwsTokenProvider::new("client-42", LONG_KEY, 60).unwrap();
        provider.token().unwrap();
        provider.invalidate();
        assert!(provider.cached.load().is_none());
    }

    #[test]
    fn test_debug_hides_key() {
        let provider = BwsTokenProvider::new("client-42", LONG_KEY, 60).unwrap();
        let debug = format!("{provider:?}");
        assert!(!debug.contains(LONG_KEY));
        assert!(debug.contains("client-42"));
    }
}
