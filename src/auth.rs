//! Socket authentication: cookie-carried HS256 bearer tokens.
//!
//! The login service issues a compact JWS (`header.payload.signature`,
//! base64url) in the `access_token` cookie with a `user_id` claim and a
//! `sid` session claim. The socket layer verifies the signature, checks
//! expiry, and pins `sid` against the user's latest active session row.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::protocol::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Why a token failed verification. All variants map to close code 4401.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("malformed bearer token")]
    Malformed,
    #[error("bearer token signature mismatch")]
    BadSignature,
    #[error("bearer token expired")]
    Expired,
    #[error("bearer token lacks a required claim")]
    MissingClaim,
}

/// Identity proven by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenIdentity {
    pub user_id: UserId,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    user_id: Option<UserId>,
    sid: Option<String>,
    exp: Option<i64>,
}

/// Extract a cookie value from a raw `Cookie` header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then_some(value.trim())
    })
}

/// Verify a compact HS256 token and pull out the identity claims.
pub fn verify_token(token: &str, secret: &str) -> Result<TokenIdentity, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::BadSignature);
    }

    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::Malformed);
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::BadSignature)?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let signature = BASE64_URL
        .decode(signature)
        .map_err(|_| AuthError::Malformed)?;
    mac.verify_slice(&signature)
        .map_err(|_| AuthError::BadSignature)?;

    let payload = BASE64_URL
        .decode(payload)
        .map_err(|_| AuthError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;

    if let Some(exp) = claims.exp {
        if exp <= chrono::Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
    }

    match (claims.user_id, claims.sid) {
        (Some(user_id), Some(session_id)) if !session_id.is_empty() => Ok(TokenIdentity {
            user_id,
            session_id,
        }),
        _ => Err(AuthError::MissingClaim),
    }
}

/// Authenticate a request's cookie header. `None` anywhere along the way is
/// an unauthenticated socket.
pub fn identity_from_cookie_header(
    header: Option<&str>,
    cookie_name: &str,
    secret: &str,
) -> Result<TokenIdentity, AuthError> {
    let header = header.ok_or(AuthError::Missing)?;
    let token = cookie_value(header, cookie_name).ok_or(AuthError::Missing)?;
    verify_token(token, secret)
}

/// Mint a token the way the login service does. Test-only helper that keeps
/// the signing details in one place.
pub fn sign_token(user_id: UserId, session_id: &str, exp: Option<i64>, secret: &str) -> String {
    let header = BASE64_URL.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let mut claims = serde_json::json!({
        "user_id": user_id,
        "sid": session_id,
    });
    if let Some(exp) = exp {
        claims["exp"] = serde_json::json!(exp);
    }
    let payload = BASE64_URL.encode(claims.to_string());
    // SAFETY: HMAC-SHA256 accepts keys of any length.
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key");
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let signature = BASE64_URL.encode(mac.finalize().into_bytes());
    format!("{header}.{payload}.{signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-signing-key";

    #[test]
    fn test_round_trip() {
        let token = sign_token(42, "sess-abc", None, SECRET);
        let identity = verify_token(&token, SECRET).unwrap();
        assert_eq!(identity.user_id, 42);
        assert_eq!(identity.session_id, "sess-abc");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign_token(42, "sess-abc", None, SECRET);
        assert_eq!(
            verify_token(&token, "other-key").unwrap_err(),
            AuthError::BadSignature
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = sign_token(42, "sess-abc", None, SECRET);
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = BASE64_URL.encode(r#"{"user_id":1,"sid":"sess-abc"}"#);
        parts[1] = &forged;
        let forged_token = parts.join(".");
        assert_eq!(
            verify_token(&forged_token, SECRET).unwrap_err(),
            AuthError::BadSignature
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let past = chrono::Utc::now().timestamp() - 60;
        let token = sign_token(42, "sess-abc", Some(past), SECRET);
        assert_eq!(verify_token(&token, SECRET).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn test_future_expiry_accepted() {
        let future = chrono::Utc::now().timestamp() + 3600;
        let token = sign_token(42, "sess-abc", Some(future), SECRET);
        assert!(verify_token(&token, SECRET).is_ok());
    }

    #[test]
    fn test_missing_claims_rejected() {
        let header = BASE64_URL.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = BASE64_URL.encode(r#"{"user_id":42}"#);
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        let signature = BASE64_URL.encode(mac.finalize().into_bytes());
        let token = format!("{header}.{payload}.{signature}");
        assert_eq!(
            verify_token(&token, SECRET).unwrap_err(),
            AuthError::MissingClaim
        );
    }

    #[test]
    fn test_cookie_parsing() {
        let header = "theme=dark; access_token=abc.def.ghi; lang=en";
        assert_eq!(cookie_value(header, "access_token"), Some("abc.def.ghi"));
        assert_eq!(cookie_value(header, "theme"), Some("dark"));
        assert_eq!(cookie_value(header, "missing"), None);
    }

    #[test]
    fn test_identity_from_cookie_header() {
        let token = sign_token(7, "s-1", None, SECRET);
        let header = format!("access_token={token}");
        let identity =
            identity_from_cookie_header(Some(&header), "access_token", SECRET).unwrap();
        assert_eq!(identity.user_id, 7);

        assert_eq!(
            identity_from_cookie_header(None, "access_token", SECRET).unwrap_err(),
            AuthError::Missing
        );
        assert_eq!(
            identity_from_cookie_header(Some("other=1"), "access_token", SECRET).unwrap_err(),
            AuthError::Missing
        );
    }

    #[test]
    fn test_empty_secret_rejects_everything() {
        let token = sign_token(42, "sess-abc", None, SECRET);
        assert!(verify_token(&token, "").is_err());
    }
}
