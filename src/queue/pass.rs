//! Signed queue-pass tokens: proof that a user has been admitted past the
//! virtual queue for a given event, valid for a bounded window.

use crate::errors::ServiceError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuePassClaims {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub purpose: String,
    pub issued_at: i64,
    pub not_before: i64,
    /// Named `exp` (not `expires_at`) because `jsonwebtoken`'s `validate_exp`
    /// only looks at a claim of that literal name.
    pub exp: i64,
    pub nonce: String,
}

const PURPOSE: &str = "queue_pass";

pub fn mint(
    user_id: Uuid,
    event_id: Uuid,
    now: i64,
    ttl_seconds: i64,
    secret: &str,
) -> Result<String, ServiceError> {
    let claims = QueuePassClaims {
        user_id,
        event_id,
        purpose: PURPOSE.to_string(),
        issued_at: now,
        not_before: now,
        exp: now + ttl_seconds,
        nonce: Uuid::new_v4().to_string(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify(token: &str, secret: &str) -> Result<QueuePassClaims, ServiceError> {
    // Validation::default() already requires and checks `exp`; nothing to
    // override here, unlike a token format with a non-standard expiry field.
    let validation = Validation::default();
    let data = decode::<QueuePassClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    if data.claims.purpose != PURPOSE {
        return Err(ServiceError::Unauthorized(
            "token is not a queue pass".to_string(),
        ));
    }
    Ok(data.claims)
}
