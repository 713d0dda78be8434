/**
 * Session Tokens
 *
 * JWT validation for workspace requests. Tokens are issued by the account
 * service that owns users; this server only checks the signature and expiry
 * and reads the subject. `create_token` exists for tooling and tests.
 */

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifetime of tokens created by [`create_token`]
const TOKEN_LIFETIME_SECS: u64 = 30 * 24 * 60 * 60;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

/// Token settings shared by the auth middleware
#[derive(Clone)]
pub struct AuthSettings {
    secret: Arc<str>,
    /// Skip token checks entirely (local development)
    pub disabled: bool,
}

impl AuthSettings {
    pub fn new(secret: impl AsRef<str>, disabled: bool) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
            disabled,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret", &"<redacted>")
            .field("disabled", &self.disabled)
            .finish()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Create a signed token for `subject`
pub fn create_token(
    subject: &str,
    email: Option<String>,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = now_secs();
    let claims = Claims {
        sub: subject.to_string(),
        email,
        exp: now + TOKEN_LIFETIME_SECS,
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// Verify and decode a JWT token
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &key, &Validation::default())?;
    Ok(token_data.claims)
}
