use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};

use flashtrack_types::api::Claims;

use crate::error::AuthError;

/// Identity carried by a verified credential. Role and society are not
/// trusted from the token; they are re-read from the account store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRef {
    pub id: i64,
}

/// Issues and checks HS256 bearer tokens against one shared secret.
#[derive(Clone)]
pub struct TokenValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenValidator {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }

    pub fn issue(&self, account_id: i64) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: account_id,
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Check a raw `Authorization` header value of the form `Bearer <token>`.
    pub fn validate(&self, header: Option<&str>) -> Result<AccountRef, AuthError> {
        let header = header.ok_or(AuthError::Missing)?;
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Malformed)?;

        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            _ => AuthError::Malformed,
        })?;

        Ok(AccountRef { id: data.claims.sub })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TokenValidator {
        TokenValidator::new("unit-test-secret", Duration::hours(24))
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    #[test]
    fn test_issue_then_validate() {
        let v = validator();
        let token = v.issue(42).unwrap();
        assert_eq!(v.validate(Some(bearer(&token).as_str())).unwrap(), AccountRef { id: 42 });
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(validator().validate(None), Err(AuthError::Missing)));
    }

    #[test]
    fn test_malformed_headers() {
        let v = validator();
        let token = v.issue(1).unwrap();
        for header in [token.as_str(), "Basic abc", "Bearer ", "Bearer not.a.jwt", "bearer x"] {
            assert!(
                matches!(v.validate(Some(header)), Err(AuthError::Malformed)),
                "{header:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_expired_token() {
        let v = validator();
        let past = Utc::now() - Duration::hours(2);
        let claims = Claims {
            sub: 7,
            iat: (past - Duration::hours(24)).timestamp() as usize,
            exp: past.timestamp() as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &v.encoding).unwrap();

        assert!(matches!(v.validate(Some(bearer(&token).as_str())), Err(AuthError::Expired)));
    }

    #[test]
    fn test_foreign_secret_is_bad_signature() {
        let other = TokenValidator::new("someone-else", Duration::hours(24));
        let token = other.issue(7).unwrap();

        assert!(matches!(
            validator().validate(Some(bearer(&token).as_str())),
            Err(AuthError::BadSignature)
        ));
    }
}
