//! Join Gate
//!
//! Checks the handshake and the join request of a connecting client.
//! A client passes either with the game password or with an HS256 join
//! token whose subject names the client. The server does NOT issue tokens.

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::core::hash::{hash_with_domain, StateHash};
use crate::game::config::GameSettings;
use crate::network::protocol::PROTOCOL_IDENTIFICATION;

/// Join gate configuration.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Identification a client must present in its hello.
    pub identification: String,
    /// Version a client must present in its hello.
    pub version: String,
    /// Game password, `None` when the game is open.
    pub password: Option<String>,
    /// HS256 secret for join tokens.
    pub token_secret: Option<String>,
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Reject joins without a valid token, password or not.
    pub require_token: bool,
    /// Whether to skip expiry validation (for testing only).
    pub skip_expiry: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identification: PROTOCOL_IDENTIFICATION.to_string(),
            version: crate::VERSION.to_string(),
            password: None,
            token_secret: None,
            issuer: None,
            require_token: false,
            skip_expiry: false,
        }
    }
}

impl AuthConfig {
    /// Gate for a game: password from the settings, token options from the environment.
    pub fn for_game(settings: &GameSettings) -> Self {
        Self {
            password: Some(settings.password.clone()).filter(|p| !p.is_empty()),
            ..Self::from_env()
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            token_secret: std::env::var("JOIN_TOKEN_SECRET").ok(),
            issuer: std::env::var("JOIN_TOKEN_ISSUER").ok(),
            require_token: std::env::var("JOIN_TOKEN_REQUIRED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            skip_expiry: std::env::var("JOIN_TOKEN_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            ..Self::default()
        }
    }

    /// Check if join tokens can be validated.
    pub fn tokens_configured(&self) -> bool {
        self.token_secret.is_some()
    }
}

/// Claims of a join token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the client name the token was issued for.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
}

/// Join gate errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Hello named another game.
    #[error("identification mismatch: expected {expected}, got {got}")]
    IdentificationMismatch {
        /// Server identification.
        expected: String,
        /// Client identification.
        got: String,
    },
    /// Hello came from another version.
    #[error("version mismatch: expected {expected}, got {got}")]
    VersionMismatch {
        /// Server version.
        expected: String,
        /// Client version.
        got: String,
    },
    /// Password missing or wrong.
    #[error("wrong password")]
    WrongPassword,
    /// The server needs a join token.
    #[error("join token required")]
    TokenRequired,
    /// Token was presented but the server has no secret.
    #[error("join tokens not configured")]
    NotConfigured,
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
    /// Token was issued for another client name.
    #[error("token issued for {0}")]
    NameMismatch(String),
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Check a hello against the server's identification and version.
pub fn check_hello(identification: &str, version: &str, config: &AuthConfig) -> Result<(), AuthError> {
    if identification != config.identification {
        return Err(AuthError::IdentificationMismatch {
            expected: config.identification.clone(),
            got: identification.to_string(),
        });
    }
    if version != config.version {
        return Err(AuthError::VersionMismatch {
            expected: config.version.clone(),
            got: version.to_string(),
        });
    }
    Ok(())
}

/// Admit or refuse a join.
///
/// A valid token admits on its own; otherwise the password decides.
/// Returns the token claims when a token was used.
pub fn check_join(
    name: &str,
    password: Option<&str>,
    token: Option<&str>,
    config: &AuthConfig,
) -> Result<Option<TokenClaims>, AuthError> {
    if let Some(token) = token {
        let claims = validate_token(token, config)?;
        if claims.sub != name {
            return Err(AuthError::NameMismatch(claims.sub));
        }
        return Ok(Some(claims));
    }

    if config.require_token {
        return Err(AuthError::TokenRequired);
    }

    if let Some(expected) = &config.password {
        let given = password.unwrap_or_default();
        if password_digest(given) != password_digest(expected) {
            return Err(AuthError::WrongPassword);
        }
    }

    Ok(None)
}

/// Digest used to compare passwords at a fixed length.
fn password_digest(password: &str) -> StateHash {
    hash_with_domain(b"bomber-arena-password:", password.as_bytes())
}

/// Validate a join token and extract claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let Some(secret) = &config.token_secret else {
        return Err(AuthError::NotConfigured);
    };

    let mut validation = Validation::new(Algorithm::HS256);

    // Disable required claims validation by default
    validation.required_spec_claims = std::collections::HashSet::new();
    validation.validate_aud = false;

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let key = DecodingKey::from_secret(secret.as_bytes());
    let token_data: TokenData<TokenClaims> = decode(token, &key, &validation).map_err(map_jwt_error)?;
    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // Manual expiry check (in case validation was skipped)
    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
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
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key-256-bits-long!!";

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
        }
    }

    fn token_config() -> AuthConfig {
        AuthConfig {
            token_secret: Some(SECRET.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_hello_checks() {
        let config = AuthConfig::default();
        assert!(check_hello(PROTOCOL_IDENTIFICATION, crate::VERSION, &config).is_ok());
        assert!(matches!(
            check_hello("other-game", crate::VERSION, &config),
            Err(AuthError::IdentificationMismatch { .. })
        ));
        assert!(matches!(
            check_hello(PROTOCOL_IDENTIFICATION, "0.0.0-old", &config),
            Err(AuthError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_open_game_admits_anyone() {
        let config = AuthConfig::default();
        assert_eq!(check_join("alice", None, None, &config), Ok(None));
        assert_eq!(check_join("alice", Some("whatever"), None, &config), Ok(None));
    }

    #[test]
    fn test_password_required() {
        let config = AuthConfig {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(check_join("alice", Some("hunter2"), None, &config).is_ok());
        assert_eq!(check_join("alice", Some("hunter3"), None, &config), Err(AuthError::WrongPassword));
        assert_eq!(check_join("alice", None, None, &config), Err(AuthError::WrongPassword));
    }

    #[test]
    fn test_for_game_empty_password_is_open() {
        let settings = GameSettings::default();
        assert!(AuthConfig::for_game(&settings).password.is_none());

        let mut settings = GameSettings::default();
        settings.password = "secret".into();
        assert_eq!(AuthConfig::for_game(&settings).password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_token_admits_instead_of_password() {
        let config = AuthConfig {
            password: Some("hunter2".into()),
            ..token_config()
        };
        let token = create_test_token(&test_claims("alice"), SECRET);

        let claims = check_join("alice", None, Some(&token), &config).unwrap();
        assert_eq!(claims.unwrap().sub, "alice");
    }

    #[test]
    fn test_token_for_other_name_rejected() {
        let token = create_test_token(&test_claims("bob"), SECRET);
        let result = check_join("alice", None, Some(&token), &token_config());
        assert_eq!(result, Err(AuthError::NameMismatch("bob".into())));
    }

    #[test]
    fn test_token_required() {
        let config = AuthConfig {
            require_token: true,
            ..token_config()
        };
        assert_eq!(check_join("alice", None, None, &config), Err(AuthError::TokenRequired));
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut claims = test_claims("alice");
        claims.exp = 1; // Expired in 1970
        let token = create_test_token(&claims, SECRET);

        let result = validate_token(&token, &token_config());
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let token = create_test_token(&test_claims("alice"), "correct-secret-key-here!!!!!");
        let result = validate_token(&token, &token_config());
        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_missing_sub_rejected() {
        let token = create_test_token(&test_claims(""), SECRET);
        let result = validate_token(&token, &token_config());
        assert!(matches!(result, Err(AuthError::MissingClaim(_))));
    }

    #[test]
    fn test_issuer_validation() {
        let token = create_test_token(&test_claims("alice"), SECRET);
        let config = AuthConfig {
            issuer: Some("wrong-issuer".into()),
            ..token_config()
        };

        let result = validate_token(&token, &config);
        assert!(matches!(result, Err(AuthError::InvalidIssuer)));
    }

    #[test]
    fn test_garbage_token() {
        let result = validate_token("not-a-jwt", &token_config());
        assert!(matches!(result, Err(AuthError::InvalidFormat) | Err(AuthError::DecodeError(_))));
    }

    #[test]
    fn test_not_configured_error() {
        let result = validate_token("some.jwt.token", &AuthConfig::default());
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[test]
    fn test_skip_expiry_for_testing() {
        let mut claims = test_claims("alice");
        claims.exp = 1; // Expired in 1970
        let token = create_test_token(&claims, SECRET);

        let config = AuthConfig {
            skip_expiry: true,
            ..token_config()
        };

        assert!(validate_token(&token, &config).is_ok());
    }
}
