//! Identity provider adapter. Requests carry an HS256 JWT whose `userId`
//! claim is trusted as the learner id; there is no session lookup.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

const AUTH_COOKIE_NAME: &str = "auth_token";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("missing JWT_SECRET")]
    MissingSecret,
    #[error("invalid JWT_EXPIRES_IN")]
    InvalidExpiresIn,
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, AUTH_COOKIE_NAME) {
        return Some(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn authenticate(headers: &HeaderMap, secret: Option<&str>) -> Result<AuthUser, AuthError> {
    let token = extract_token(headers).ok_or(AuthError::MissingToken)?;
    let secret = secret.ok_or(AuthError::MissingSecret)?;
    verify_jwt_hs256(&token, secret)
}

pub fn verify_jwt_hs256(token: &str, secret: &str) -> Result<AuthUser, AuthError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let payload_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let sig_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidToken);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;

    let header_json: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::InvalidToken)?;
    let alg = header_json
        .get("alg")
        .and_then(|value| value.as_str())
        .ok_or(AuthError::InvalidToken)?;
    if alg != "HS256" {
        return Err(AuthError::InvalidToken);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json: serde_json::Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::InvalidToken)?;

    validate_registered_claims(&payload_json)?;

    let user_id = payload_json
        .get("userId")
        .and_then(|value| value.as_str())
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::InvalidToken)?
        .to_string();

    Ok(AuthUser { id: user_id })
}

fn validate_registered_claims(payload: &serde_json::Value) -> Result<(), AuthError> {
    let now = Utc::now().timestamp();

    if let Some(exp) = payload.get("exp").and_then(|value| value.as_i64()) {
        if now >= exp {
            return Err(AuthError::InvalidToken);
        }
    }

    if let Some(nbf) = payload.get("nbf").and_then(|value| value.as_i64()) {
        if now < nbf {
            return Err(AuthError::InvalidToken);
        }
    }

    Ok(())
}

/// Issues a token the way the identity provider does. Used by tests and
/// local tooling.
pub fn sign_jwt_for_user(user_id: &str, secret: &str, expires_in: &str) -> Result<String, AuthError> {
    let expires_in_ms = parse_expires_in_ms(expires_in)?;

    let issued_at = Utc::now();
    let exp = issued_at
        .checked_add_signed(chrono::Duration::milliseconds(expires_in_ms))
        .ok_or(AuthError::InvalidExpiresIn)?;

    let header_json = serde_json::json!({
        "alg": "HS256",
        "typ": "JWT",
    });

    let payload_json = serde_json::json!({
        "userId": user_id,
        "iat": issued_at.timestamp(),
        "exp": exp.timestamp(),
    });

    let header_b64 = URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&header_json).map_err(|_| AuthError::InvalidToken)?);
    let payload_b64 = URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&payload_json).map_err(|_| AuthError::InvalidToken)?);
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{sig_b64}"))
}

pub fn parse_expires_in_ms(value: &str) -> Result<i64, AuthError> {
    let trimmed = value.trim();
    if trimmed.len() < 2 {
        return Err(AuthError::InvalidExpiresIn);
    }

    let (digits, unit) = trimmed.split_at(trimmed.len() - 1);

    let amount: i64 = digits.parse().map_err(|_| AuthError::InvalidExpiresIn)?;
    if amount <= 0 {
        return Err(AuthError::InvalidExpiresIn);
    }

    match unit {
        "s" => Ok(amount * 1000),
        "m" => Ok(amount * 60 * 1000),
        "h" => Ok(amount * 60 * 60 * 1000),
        "d" => Ok(amount * 24 * 60 * 60 * 1000),
        _ => Err(AuthError::InvalidExpiresIn),
    }
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        if key == name && !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn test_sign_then_verify() {
        let token = sign_jwt_for_user("learner-1", SECRET, "1h").unwrap();
        let user = verify_jwt_hs256(&token, SECRET).unwrap();
        assert_eq!(user.id, "learner-1");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign_jwt_for_user("learner-1", SECRET, "1h").unwrap();
        assert!(matches!(
            verify_jwt_hs256(&token, "other"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = sign_jwt_for_user("learner-1", SECRET, "1h").unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(br#"{"userId":"admin"}"#);
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_payload;
        assert!(verify_jwt_hs256(&parts.join("."), SECRET).is_err());
    }

    #[test]
    fn test_token_from_cookie_or_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; auth_token=xyz"));
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_missing_token() {
        let headers = HeaderMap::new();
        assert!(matches!(
            authenticate(&headers, Some(SECRET)),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_parse_expires_in() {
        assert_eq!(parse_expires_in_ms("24h").unwrap(), 86_400_000);
        assert_eq!(parse_expires_in_ms("30s").unwrap(), 30_000);
        assert!(parse_expires_in_ms("h").is_err());
        assert!(parse_expires_in_ms("0d").is_err());
        assert!(parse_expires_in_ms("5y").is_err());
    }
}
