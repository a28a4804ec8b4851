//! Identity verification for the notify and token endpoints.
//!
//! When `auth.jwtSecret` is set, requests must carry
//! `Authorization: Bearer <HS256 JWT>` and the token's `sub` becomes the
//! verified identity. Without a secret every request is accepted with the
//! identity the caller supplies.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tether_core::ids::UserId;
use tether_settings::AuthSettings;
use tracing::debug;

/// Identity verification failure.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No bearer token.
    #[error("Unauthorized: missing bearer token")]
    Missing,
    /// Token present but not a bearer token.
    #[error("Unauthorized: malformed authorization header")]
    Malformed,
    /// Token failed verification.
    #[error("Unauthorized: {reason}")]
    Invalid {
        /// Verification error.
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    sub: String,
}

/// Verifies bearer tokens issued by the authentication provider.
pub struct Authenticator {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Build from settings. A missing or empty secret disables verification.
    pub fn new(settings: &AuthSettings) -> Self {
        let key = settings
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| DecodingKey::from_secret(s.as_bytes()));
        Self {
            key,
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// An authenticator that accepts everything.
    pub fn disabled() -> Self {
        Self::new(&AuthSettings::default())
    }

    /// Whether requests must carry a token.
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Verify the request's bearer token.
    ///
    /// Returns `Ok(None)` when verification is disabled.
    pub fn verify(&self, headers: &HeaderMap) -> Result<Option<UserId>, AuthError> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let value = headers.get(AUTHORIZATION).ok_or(AuthError::Missing)?;
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Malformed)?;

        let data = jsonwebtoken::decode::<IdentityClaims>(token, key, &self.validation).map_err(
            |e| AuthError::Invalid {
                reason: e.to_string(),
            },
        )?;
        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::Invalid {
                reason: "token has no subject".into(),
            });
        }
        debug!(identity = %data.claims.sub, "request authenticated");
        Ok(Some(UserId::new(data.claims.sub)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "auth-secret";

    fn enabled() -> Authenticator {
        Authenticator::new(&AuthSettings {
            jwt_secret: Some(SECRET.into()),
        })
    }

    fn token(sub: &str, exp_offset: i64) -> String {
        let claims = json!({"sub": sub, "exp": chrono::Utc::now().timestamp() + exp_offset});
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn headers(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        let _ = h.insert(AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn disabled_accepts_anything() {
        let auth = Authenticator::disabled();
        assert!(!auth.is_enabled());
        assert_eq!(auth.verify(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn valid_token_yields_identity() {
        let auth = enabled();
        let h = headers(&format!("Bearer {}", token("u1", 300)));
        assert_eq!(auth.verify(&h).unwrap(), Some(UserId::new("u1")));
    }

    #[test]
    fn missing_header() {
        assert_matches!(enabled().verify(&HeaderMap::new()), Err(AuthError::Missing));
    }

    #[test]
    fn non_bearer_header() {
        assert_matches!(enabled().verify(&headers("Basic abc")), Err(AuthError::Malformed));
    }

    #[test]
    fn expired_token() {
        let h = headers(&format!("Bearer {}", token("u1", -600)));
        assert_matches!(enabled().verify(&h), Err(AuthError::Invalid { .. }));
    }

    #[test]
    fn empty_secret_disables() {
        let auth = Authenticator::new(&AuthSettings {
            jwt_secret: Some(String::new()),
        });
        assert!(!auth.is_enabled());
    }
}
