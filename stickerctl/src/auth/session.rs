//! Signed session tokens (HS256 JWT) and the cookie that carries them.
//!
//! Claims hold only the user id and timestamps. Name, email, role and balance are always
//! re-read from the store, so a token never grants more than the account currently has.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{config::Config, errors::Error, types::UserId};

/// JWT session claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId, // Subject (user ID)
    pub iat: i64,    // Issued at
    pub exp: i64,    // Expiration time
}

impl SessionClaims {
    pub fn new(user_id: UserId, config: &Config) -> Self {
        let now = Utc::now();
        let exp = now + config.auth.session.timeout;

        Self {
            sub: user_id,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }
}

fn secret_key(config: &Config) -> Result<&[u8], Error> {
    config
        .secret_key
        .as_deref()
        .map(str::as_bytes)
        .ok_or_else(|| Error::Internal {
            operation: "JWT sessions: secret_key is required".to_string(),
        })
}

/// Create a JWT token for a user session
pub fn create_session_token(user_id: UserId, config: &Config) -> Result<String, Error> {
    let claims = SessionClaims::new(user_id, config);
    let key = EncodingKey::from_secret(secret_key(config)?);

    encode(&Header::default(), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Verify a JWT session token and return its claims.
///
/// Any client-side defect (malformed, badly signed, expired) is `Unauthenticated`; only key or
/// library failures surface as internal errors.
pub fn verify_session_token(token: &str, config: &Config) -> Result<SessionClaims, Error> {
    let key = DecodingKey::from_secret(secret_key(config)?);

    let token_data = decode::<SessionClaims>(token, &key, &Validation::default()).map_err(|e| match e.kind() {
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::ExpiredSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::ImmatureSignature
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::InvalidAlgorithm => Error::Unauthenticated {
            message: Some("Invalid or expired session".to_string()),
        },
        _ => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },
    })?;

    Ok(token_data.claims)
}

/// `Set-Cookie` value carrying a fresh session token
pub fn session_cookie(token: &str, config: &Config) -> String {
    let session = &config.auth.session;
    let secure = if session.cookie_secure { "; Secure" } else { "" };

    format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}{}",
        session.cookie_name,
        token,
        session.cookie_same_site,
        session.timeout.as_secs(),
        secure
    )
}

/// `Set-Cookie` value that clears the session cookie
pub fn expired_session_cookie(config: &Config) -> String {
    let session = &config.auth.session;
    let secure = if session.cookie_secure { "; Secure" } else { "" };

    format!(
        "{}=; Path=/; HttpOnly; SameSite={}; Max-Age=0{}",
        session.cookie_name, session.cookie_same_site, secure
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn create_test_config() -> Config {
        Config {
            secret_key: Some("test-secret-key-for-jwt".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_verify_session_token() {
        let config = create_test_config();
        let user_id = Uuid::new_v4();

        let token = create_session_token(user_id, &config).unwrap();
        let claims = verify_session_token(&token, &config).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, config.auth.session.timeout.as_secs() as i64);
    }

    #[test]
    fn test_verify_token_wrong_secret() {
        let mut config = create_test_config();
        let token = create_session_token(Uuid::new_v4(), &config).unwrap();

        config.secret_key = Some("different-secret".to_string());
        let result = verify_session_token(&token, &config);
        assert!(matches!(result, Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_verify_expired_token() {
        let config = create_test_config();
        let now = Utc::now();
        let claims = SessionClaims {
            sub: Uuid::new_v4(),
            iat: (now - chrono::Duration::hours(2)).timestamp(),
            exp: (now - chrono::Duration::hours(1)).timestamp(),
        };
        let key = EncodingKey::from_secret(b"test-secret-key-for-jwt");
        let token = encode(&Header::default(), &claims, &key).unwrap();

        let result = verify_session_token(&token, &config);
        assert!(matches!(result, Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_verify_malformed_token() {
        let config = create_test_config();

        for token in ["not.a.token", "invalid", "", "too.many.parts.in.this.token"] {
            assert!(
                matches!(verify_session_token(token, &config), Err(Error::Unauthenticated { .. })),
                "Expected Unauthenticated error for token: {token}"
            );
        }
    }

    #[test]
    fn test_cookies() {
        let mut config = create_test_config();
        let cookie = session_cookie("abc", &config);
        assert!(cookie.starts_with("token=abc; Path=/; HttpOnly"));
        assert!(cookie.ends_with("; Secure"));
        assert!(cookie.contains(&format!("Max-Age={}", 7 * 24 * 60 * 60)));

        config.auth.session.cookie_secure = false;
        let cleared = expired_session_cookie(&config);
        assert_eq!(cleared, "token=; Path=/; HttpOnly; SameSite=lax; Max-Age=0");
    }
}
