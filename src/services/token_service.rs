//! Bearer token service.
//!
//! Tokens are macaroon-style signed blobs: an identifier bound to the user,
//! three plaintext caveats (issue timestamp, registration flag, provider),
//! and an HMAC-SHA256 signature chain keyed by a per-user secret derived
//! from the user's salt. The caveats are carried for audit but not enforced;
//! the verifier checks only that the signature chain matches the per-user
//! secret. Storage is keyed by a SHA-256 digest of the opaque blob; the blob
//! itself is never persisted.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::token::Token;
use crate::models::user::User;

type HmacSha256 = Hmac<Sha256>;

/// Domain-separation context for the per-user secret derivation.
const KEY_CONTEXT: &[u8] = b"stratum.token.v1";

const ID_PREFIX: &str = "id:";
const SIG_PREFIX: &str = "sig:";

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts any key length")
}

/// Per-user signing secret, derived from the salt.
fn derive_user_key(salt: &str) -> Vec<u8> {
    let mut mac = new_mac(KEY_CONTEXT);
    mac.update(salt.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// HMAC chain over the identifier and each caveat in order, returning the
/// final step unfinalized so verification can be constant-time.
fn chain_mac(salt: &str, user_id: Uuid, caveats: &[String]) -> HmacSha256 {
    let key = derive_user_key(salt);
    let mut mac = new_mac(&key);
    mac.update(user_id.to_string().as_bytes());
    for caveat in caveats {
        let sig = mac.finalize().into_bytes();
        mac = new_mac(&sig);
        mac.update(caveat.as_bytes());
    }
    mac
}

/// A decoded (not yet verified) token blob.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub user_id: Uuid,
    pub caveats: Vec<String>,
    pub signature: Vec<u8>,
}

redacted_debug!(SignedToken {
    show user_id,
    show caveats,
    redact signature,
});

impl SignedToken {
    /// Sign a new token for the given user.
    pub fn mint(salt: &str, user_id: Uuid, caveats: Vec<String>) -> Self {
        let signature = chain_mac(salt, user_id, &caveats)
            .finalize()
            .into_bytes()
            .to_vec();
        Self {
            user_id,
            caveats,
            signature,
        }
    }

    /// Serialize to the opaque wire blob.
    pub fn encode(&self) -> String {
        let mut lines = Vec::with_capacity(self.caveats.len() + 2);
        lines.push(format!("{ID_PREFIX}{}", self.user_id));
        lines.extend(self.caveats.iter().cloned());
        lines.push(format!("{SIG_PREFIX}{}", hex::encode(&self.signature)));
        URL_SAFE_NO_PAD.encode(lines.join("\n"))
    }

    /// Parse an opaque blob. Structural validation only; the signature is
    /// checked separately against the resolved user's salt.
    pub fn decode(blob: &str) -> Result<Self> {
        let invalid = || AppError::Unauthorized("Invalid token".to_string());

        let raw = URL_SAFE_NO_PAD.decode(blob).map_err(|_| invalid())?;
        let text = String::from_utf8(raw).map_err(|_| invalid())?;
        let mut lines = text.lines();

        let user_id = lines
            .next()
            .and_then(|l| l.strip_prefix(ID_PREFIX))
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(invalid)?;

        let mut caveats: Vec<String> = lines.map(str::to_string).collect();
        let signature = caveats
            .pop()
            .and_then(|l| l.strip_prefix(SIG_PREFIX).map(str::to_string))
            .and_then(|sig| hex::decode(sig).ok())
            .ok_or_else(invalid)?;

        Ok(Self {
            user_id,
            caveats,
            signature,
        })
    }

    /// Recompute the signature chain against a salt. Caveat values are
    /// accepted as-is; only the chain itself is validated.
    pub fn verify(&self, salt: &str) -> bool {
        chain_mac(salt, self.user_id, &self.caveats)
            .verify_slice(&self.signature)
            .is_ok()
    }
}

/// Storage/lookup key for an opaque blob.
pub fn token_digest(blob: &str) -> String {
    hex::encode(Sha256::digest(blob.as_bytes()))
}

/// Bearer token issuance and resolution.
pub struct TokenService {
    db: PgPool,
    config: Arc<Config>,
}

impl TokenService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Issue a new bearer token for a user.
    ///
    /// The opaque blob is returned exactly once; only its digest is stored.
    pub async fn issue(
        &self,
        user: &User,
        ip: Option<String>,
        provider: &str,
        is_registration: bool,
    ) -> Result<(String, Token)> {
        let now = Utc::now();
        let caveats = vec![
            format!("created:{}", now.timestamp()),
            format!("register:{}", is_registration),
            format!("provider:{}", provider),
        ];
        let blob = SignedToken::mint(&user.salt, user.id, caveats).encode();
        let digest = token_digest(&blob);
        let valid_until = now + Duration::hours(self.config.token_ttl_hours);

        let token: Token = sqlx::query_as(
            r#"
            INSERT INTO tokens (digest, user_id, created_at, valid_until, ip)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING digest, user_id, created_at, valid_until, ip
            "#,
        )
        .bind(&digest)
        .bind(user.id)
        .bind(now)
        .bind(valid_until)
        .bind(&ip)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((blob, token))
    }

    /// Resolve an opaque blob to its user.
    ///
    /// Fails `Unauthorized` when the digest is unknown, the token is expired,
    /// or the signature does not match the resolved user's salt (defense
    /// against digest collision and tampering).
    pub async fn resolve(&self, blob: &str) -> Result<User> {
        let digest = token_digest(blob);

        let token: Token = sqlx::query_as(
            r#"
            SELECT digest, user_id, created_at, valid_until, ip
            FROM tokens
            WHERE digest = $1
            "#,
        )
        .bind(&digest)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

        if token.is_expired(Utc::now()) {
            return Err(AppError::Unauthorized("Token expired".to_string()));
        }

        let user: User = sqlx::query_as(
            r#"
            SELECT id, email, password_hash, salt, type_id, scope_id,
                   is_active, display_name, created_at, deleted_at
            FROM users
            WHERE id = $1 AND deleted_at IS NULL AND is_active = true
            "#,
        )
        .bind(token.user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

        let signed = SignedToken::decode(blob)?;
        if signed.user_id != user.id || !signed.verify(&user.salt) {
            // Log the digest only, never the blob.
            tracing::warn!(digest = %digest, "token signature mismatch");
            return Err(AppError::Unauthorized("Invalid token".to_string()));
        }

        Ok(user)
    }

    /// Delete expired token rows. Expiry is otherwise checked at resolve
    /// time, so this is housekeeping, not enforcement.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE valid_until < NOW()")
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
