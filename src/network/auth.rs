//! Connection Gate
//!
//! Validates JWTs from an external identity provider and resolves them
//! to stored user records. The server does NOT issue tokens - only
//! validates them. A connection that fails here is refused before any
//! event handler is registered.

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::store::{UserRecord, UserStore};

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format (preferred for external providers).
    pub public_key_pem: Option<String>,
    /// HS256 secret (fallback for simple setups).
    pub secret: Option<String>,
    /// Whether to skip expiry validation (for testing only).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Check if authentication is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Standard JWT claims we expect from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject - the user id issued at login.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer (auth provider).
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Parse the subject claim as a user id.
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::MissingClaim("sub".into()))
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authentication configured on server.
    #[error("authentication not configured")]
    NotConfigured,
    /// No credential present in the handshake.
    #[error("no credential presented")]
    MissingCredential,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match expected value.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing or malformed.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// The subject does not resolve to a known user.
    #[error("unknown user")]
    UnknownUser,
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
    /// Store failure while resolving the identity.
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

/// Extract the credential from websocket handshake headers.
///
/// Accepts either a `token` cookie (browser clients) or an
/// `Authorization: Bearer` header (native clients).
pub fn credential_from_headers(
    cookie_header: Option<&str>,
    authorization: Option<&str>,
) -> Option<String> {
    if let Some(cookies) = cookie_header {
        for pair in cookies.split(';') {
            let pair = pair.trim();
            if let Some(value) = pair.strip_prefix("token=") {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    authorization
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Validate a JWT token and extract claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    // Determine algorithm based on config
    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else {
        Algorithm::HS256
    };

    // Build validation rules
    let mut validation = Validation::new(algorithm);

    // Disable required claims validation by default
    validation.required_spec_claims = std::collections::HashSet::new();

    // Set expected issuer (if not set, any issuer is accepted)
    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    // Set expected audience (if not set, skip audience validation)
    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    // Handle expiry validation
    if config.skip_expiry {
        validation.validate_exp = false;
    }

    // Decode and validate
    let token_data: TokenData<TokenClaims> = if let Some(ref pem) = config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else if let Some(ref secret) = config.secret {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else {
        return Err(AuthError::NotConfigured);
    };

    let claims = token_data.claims;

    // Validate subject exists
    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // Manual expiry check (in case validation was skipped)
    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

/// Authenticate a handshake credential end to end: validate the token,
/// then resolve the subject against the user directory.
pub async fn resolve_identity(
    credential: Option<&str>,
    config: &AuthConfig,
    users: &Arc<dyn UserStore>,
) -> Result<UserRecord, AuthError> {
    let token = credential.ok_or(AuthError::MissingCredential)?;
    let claims = validate_token(token, config)?;
    let user_id = claims.user_id()?;

    users.find(user_id).await?.ok_or(AuthError::UnknownUser)
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUserStore;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_token(claims: &TokenClaims, secret: &str) -> String {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&header, claims, &key).unwrap()
    }

    fn test_claims(sub: &str) -> TokenClaims {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        TokenClaims {
            sub: sub.into(),
            exp: now + 3600, // 1 hour from now
            iat: now,
            iss: Some("test-issuer".into()),
            aud: None,
        }
    }

    #[test]
    fn test_valid_token_validation() {
        let secret = "test-secret-key-256-bits-long!!";
        let claims = test_claims("user123");
        let token = create_test_token(&claims, secret);

        let config = AuthConfig {
            secret: Some(secret.into()),
            ..Default::default()
        };

        let result = validate_token(&token, &config);
        assert!(result.is_ok());
        assert_eq!(result.unwrap().sub, "user123");
    }

    #[test]
    fn test_expired_token_rejected() {
        let secret = "test-secret-key-256-bits-long!!";
        let mut claims = test_claims("user123");
        claims.exp = 1; // Expired in 1970

        let token = create_test_token(&claims, secret);

        let config = AuthConfig {
            secret: Some(secret.into()),
            ..Default::default()
        };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let claims = test_claims("user123");
        let token = create_test_token(&claims, "correct-secret-key-here!!!!!");

        let config = AuthConfig {
            secret: Some("wrong-secret-key-here!!!!!!".into()),
            ..Default::default()
        };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_missing_sub_rejected() {
        let secret = "test-secret-key-256-bits-long!!";
        let mut claims = test_claims("user123");
        claims.sub = String::new();

        let token = create_test_token(&claims, secret);

        let config = AuthConfig {
            secret: Some(secret.into()),
            ..Default::default()
        };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::MissingClaim(_))));
    }

    #[test]
    fn test_issuer_validation() {
        let secret = "test-secret-key-256-bits-long!!";
        let claims = test_claims("user123");
        let token = create_test_token(&claims, secret);

        let config = AuthConfig {
            secret: Some(secret.into()),
            issuer: Some("wrong-issuer".into()),
            ..Default::default()
        };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidIssuer)));
    }

    #[test]
    fn test_not_configured_error() {
        let config = AuthConfig::default();
        let result = validate_token("some.jwt.token", &config);
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn test_skip_expiry_for_testing() {
        let secret = "test-secret-key-256-bits-long!!";
        let mut claims = test_claims("user123");
        claims.exp = 1; // Expired in 1970

        let token = create_test_token(&claims, secret);

        let config = AuthConfig {
            secret: Some(secret.into()),
            skip_expiry: true,
            ..Default::default()
        };

        let result = validate_token(&token, &config);
        assert!(result.is_ok());
    }

    #[test]
    fn test_credential_from_cookie() {
        let cred = credential_from_headers(Some("sid=abc; token=jwt-here; theme=dark"), None);
        assert_eq!(cred.as_deref(), Some("jwt-here"));
    }

    #[test]
    fn test_credential_from_bearer() {
        let cred = credential_from_headers(None, Some("Bearer jwt-here"));
        assert_eq!(cred.as_deref(), Some("jwt-here"));
    }

    #[test]
    fn test_cookie_takes_precedence() {
        let cred = credential_from_headers(Some("token=cookie-jwt"), Some("Bearer header-jwt"));
        assert_eq!(cred.as_deref(), Some("cookie-jwt"));
    }

    #[test]
    fn test_no_credential() {
        assert!(credential_from_headers(Some("theme=dark"), None).is_none());
        assert!(credential_from_headers(None, None).is_none());
    }

    #[tokio::test]
    async fn test_resolve_identity_unknown_user() {
        let secret = "test-secret-key-256-bits-long!!";
        let user_id = Uuid::new_v4();
        let token = create_test_token(&test_claims(&user_id.to_string()), secret);

        let config = AuthConfig {
            secret: Some(secret.into()),
            ..Default::default()
        };
        let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());

        let result = resolve_identity(Some(&token), &config, &users).await;
        assert!(matches!(result, Err(AuthError::UnknownUser)));
    }

    #[tokio::test]
    async fn test_resolve_identity_success() {
        let secret = "test-secret-key-256-bits-long!!";
        let user_id = Uuid::new_v4();
        let token = create_test_token(&test_claims(&user_id.to_string()), secret);

        let config = AuthConfig {
            secret: Some(secret.into()),
            ..Default::default()
        };
        let memory = MemoryUserStore::new();
        memory
            .upsert(UserRecord {
                id: user_id,
                name: "Asha".into(),
                email: "asha@example.com".into(),
                avatar: "https://cdn.example.com/a.png".into(),
            })
            .await;
        let users: Arc<dyn UserStore> = Arc::new(memory);

        let user = resolve_identity(Some(&token), &config, &users)
            .await
            .unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.name, "Asha");
    }

    #[tokio::test]
    async fn test_resolve_identity_missing_credential() {
        let config = AuthConfig {
            secret: Some("secret".into()),
            ..Default::default()
        };
        let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
        let result = resolve_identity(None, &config, &users).await;
        assert!(matches!(result, Err(AuthError::MissingCredential)));
    }
}
