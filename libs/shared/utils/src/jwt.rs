use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use shared_models::auth::{JwtClaims, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("JWT secret is not configured")]
    MissingSecret,

    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,
}

/// Verify an HS256 token against the shared secret and produce the
/// authenticated `User`. Expiry is checked against the `exp` claim when
/// present; tokens without `exp` are accepted.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, AuthError> {
    if jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let mut segments = token.split('.');
    let (header_b64, claims_b64, signature_b64) =
        match (segments.next(), segments.next(), segments.next()) {
            (Some(h), Some(c), Some(s)) if segments.next().is_none() => (h, c, s),
            _ => return Err(AuthError::Malformed),
        };

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| AuthError::MissingSecret)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("token signature verification failed");
        return Err(AuthError::InvalidSignature);
    }

    let claims = decode_claims(claims_b64)?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("token expired at {} (now: {})", exp, now);
            return Err(AuthError::Expired);
        }
    }

    let created_at = claims
        .iat
        .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single());

    let user = User {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("token validated for user {}", user.id);
    Ok(user)
}

fn decode_claims(claims_b64: &str) -> Result<JwtClaims, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| AuthError::Malformed)?;

    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mint_token, TestUser};
    use assert_matches::assert_matches;

    const SECRET: &str = "unit-test-secret-with-enough-entropy-to-sign";

    #[test]
    fn accepts_freshly_minted_token() {
        let minted = TestUser::patient("pat@example.com");
        let token = mint_token(&minted, SECRET, 2);

        let user = validate_token(&token, SECRET).expect("token should validate");
        assert_eq!(user.id, minted.id);
        assert_eq!(user.role.as_deref(), Some("patient"));
    }

    #[test]
    fn rejects_expired_token() {
        let minted = TestUser::doctor("doc@example.com");
        let token = mint_token(&minted, SECRET, -1);

        assert_matches!(validate_token(&token, SECRET), Err(AuthError::Expired));
    }

    #[test]
    fn rejects_wrong_secret() {
        let minted = TestUser::admin("admin@example.com");
        let token = mint_token(&minted, "some-other-secret", 2);

        assert_matches!(
            validate_token(&token, SECRET),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(
            validate_token("not-even-a-token", SECRET),
            Err(AuthError::Malformed)
        );
        assert_matches!(
            validate_token("a.b.c.d", SECRET),
            Err(AuthError::Malformed)
        );
    }

    #[test]
    fn rejects_empty_secret() {
        let minted = TestUser::patient("pat@example.com");
        let token = mint_token(&minted, SECRET, 2);

        assert_matches!(validate_token(&token, ""), Err(AuthError::MissingSecret));
    }
}
