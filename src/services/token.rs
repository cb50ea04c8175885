//! API token issuance and verification
//!
//! Login returns a short-lived access token and a longer-lived refresh token,
//! both HS256 JWTs. The `typ` claim keeps one from being used as the other.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id as a string
    pub sub: String,
    pub user_id: i64,
    pub role: Role,
    pub typ: TokenType,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
}

/// Token pair returned by login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, wrong issuer, expired or malformed
    #[error("Invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Expected a {expected:?} token")]
    WrongType { expected: TokenType },
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str, issuer: String, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.issuer.clone(),
            Duration::minutes(config.access_ttl_minutes),
            Duration::hours(config.refresh_ttl_hours),
        )
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access: self.issue(user.id, user.role, TokenType::Access)?,
            refresh: self.issue(user.id, user.role, TokenType::Refresh)?,
        })
    }

    /// Exchange a refresh token for a new access token
    pub fn refresh_access(&self, refresh_token: &str) -> Result<String, TokenError> {
        let claims = self.verify(refresh_token, TokenType::Refresh)?;
        self.issue(claims.user_id, claims.role, TokenType::Access)
    }

    /// Verify a token presented as a bearer credential
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenType::Access)
    }

    fn issue(&self, user_id: i64, role: Role, typ: TokenType) -> Result<String, TokenError> {
        let now = Utc::now();
        let ttl = match typ {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            sub: user_id.to_string(),
            user_id,
            role,
            typ,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;
        if claims.typ != expected {
            return Err(TokenError::WrongType { expected });
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new("test_secret", "newsdesk".into(), Duration::minutes(5), Duration::hours(24))
    }

    fn user() -> User {
        let mut user = User::new("jane".into(), "jane@example.com".into(), "h".into(), Role::Journalist);
        user.id = 42;
        user
    }

    #[test]
    fn test_issue_and_verify_access() {
        let pair = service().issue_pair(&user()).unwrap();
        let claims = service().verify_access(&pair.access).unwrap();

        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, Role::Journalist);
        assert_eq!(claims.iss, "newsdesk");
        let lifetime = claims.exp - claims.iat;
        assert_eq!(lifetime, 5 * 60);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let pair = service().issue_pair(&user()).unwrap();
        assert!(matches!(
            service().verify_access(&pair.refresh),
            Err(TokenError::WrongType { expected: TokenType::Access })
        ));
        assert!(service().refresh_access(&pair.access).is_err());
    }

    #[test]
    fn test_refresh_issues_new_access_token() {
        let pair = service().issue_pair(&user()).unwrap();
        let access = service().refresh_access(&pair.refresh).unwrap();
        assert_eq!(service().verify_access(&access).unwrap().user_id, 42);
    }

    #[test]
    fn test_wrong_secret_or_issuer_rejected() {
        let pair = service().issue_pair(&user()).unwrap();

        let other_secret =
            JwtService::new("other", "newsdesk".into(), Duration::minutes(5), Duration::hours(1));
        assert!(other_secret.verify_access(&pair.access).is_err());

        let other_issuer =
            JwtService::new("test_secret", "elsewhere".into(), Duration::minutes(5), Duration::hours(1));
        assert!(other_issuer.verify_access(&pair.access).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired =
            JwtService::new("test_secret", "newsdesk".into(), Duration::minutes(-10), Duration::hours(1));
        let pair = expired.issue_pair(&user()).unwrap();
        assert!(expired.verify_access(&pair.access).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(service().verify_access("not.a.jwt").is_err());
    }
}
