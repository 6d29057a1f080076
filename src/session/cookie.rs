//! Signed OIDC session cookie.
//!
//! Cookie value: `session_id.base64url(hmac_sha256(secret, session_id))`
//!
//! The session id is already base64 (standard alphabet), which never
//! contains `.`, so the last `.` always separates id from signature.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "oidc_session";

fn mac(secret: &[u8], session_id: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key length is always valid");
    mac.update(session_id.as_bytes());
    mac
}

/// Produce the cookie value for an encoded session id.
pub fn sign_session_id(secret: &[u8], session_id: &str) -> String {
    let signature = mac(secret, session_id).finalize().into_bytes();
    format!("{}.{}", session_id, URL_SAFE_NO_PAD.encode(signature))
}

/// Verify a cookie value and return the encoded session id it carries.
///
/// `None` for a bad signature or a malformed value.
pub fn verify_cookie(secret: &[u8], cookie_value: &str) -> Option<String> {
    let (session_id, sig_part) = cookie_value.rsplit_once('.')?;
    if session_id.is_empty() {
        return None;
    }
    let signature = URL_SAFE_NO_PAD.decode(sig_part).ok()?;
    mac(secret, session_id).verify_slice(&signature).ok()?;
    Some(session_id.to_string())
}

/// `Set-Cookie` value establishing the session cookie.
pub fn make_set_cookie(secret: &str, session_id: &str, https_only: bool) -> String {
    let signed = sign_session_id(secret.as_bytes(), session_id);
    let mut parts = vec![
        format!("{COOKIE_NAME}={signed}"),
        "Path=/".into(),
        "HttpOnly".into(),
        "SameSite=Lax".into(),
    ];
    if https_only {
        parts.push("Secure".into());
    }
    parts.join("; ")
}

/// `Set-Cookie` value clearing the session cookie.
pub fn make_delete_cookie(https_only: bool) -> String {
    let mut parts = vec![
        format!("{COOKIE_NAME}="),
        "Max-Age=0".into(),
        "Path=/".into(),
        "HttpOnly".into(),
        "SameSite=Lax".into(),
    ];
    if https_only {
        parts.push("Secure".into());
    }
    parts.join("; ")
}

/// Find one cookie in a `Cookie` header.
pub fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
    })
}
