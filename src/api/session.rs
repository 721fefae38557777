//! Signed cookie sessions and OAuth `state` values.
//!
//! Both are HMAC-signed with the service secret. A session cookie carries
//! `<meli_user_id>:<issued unix ts>`; a login state carries
//! `login:<unix ts>:<nonce>`, where the nonce is also set as the
//! [`STATE_COOKIE`] on the browser that started the login.

use axum::http::{header, HeaderMap};
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::crypto::CryptoEngine;
use crate::error::SyncError;

pub const SESSION_COOKIE: &str = "meli_session";
pub const SESSION_TTL_SECS: i64 = 14 * 24 * 3600;
pub const STATE_TTL_SECS: i64 = 600;
pub const STATE_COOKIE: &str = "meli_oauth_state";

const STATE_PREFIX: &str = "login";
const STATE_COOKIE_PATH: &str = "/auth/meli";

pub fn issue_session(
    crypto: &CryptoEngine,
    meli_user_id: i64,
    now: DateTime<Utc>,
) -> Result<String, SyncError> {
    crypto.sign(&format!("{meli_user_id}:{}", now.timestamp()))
}

/// User id carried by a valid, unexpired session cookie.
pub fn read_session(crypto: &CryptoEngine, headers: &HeaderMap, now: DateTime<Utc>) -> Option<i64> {
    let signed = cookie_value(headers, SESSION_COOKIE)?;
    let payload = crypto.verify(signed).ok()?;
    let (user_id, issued) = payload.split_once(':')?;
    let issued: i64 = issued.parse().ok()?;
    if now.timestamp() - issued > SESSION_TTL_SECS {
        return None;
    }
    user_id.parse().ok()
}

pub fn session_cookie(value: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_TTL_SECS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

pub fn new_state_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub fn state_cookie(nonce: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{STATE_COOKIE}={nonce}; Path={STATE_COOKIE_PATH}; HttpOnly; SameSite=Lax; Max-Age={STATE_TTL_SECS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_state_cookie() -> String {
    format!("{STATE_COOKIE}=; Path={STATE_COOKIE_PATH}; HttpOnly; SameSite=Lax; Max-Age=0")
}

pub fn sign_login_state(
    crypto: &CryptoEngine,
    nonce: &str,
    now: DateTime<Utc>,
) -> Result<String, SyncError> {
    crypto.sign(&format!("{STATE_PREFIX}:{}:{nonce}", now.timestamp()))
}

/// Accept a state we signed less than [`STATE_TTL_SECS`] ago, presented by
/// the browser holding its nonce cookie.
pub fn verify_login_state(
    crypto: &CryptoEngine,
    state: &str,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Result<(), SyncError> {
    let payload = crypto.verify(state)?;
    let (issued, nonce) = payload
        .strip_prefix(STATE_PREFIX)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|rest| rest.split_once(':'))
        .ok_or(SyncError::InvalidState)?;
    let issued: i64 = issued.parse().map_err(|_| SyncError::InvalidState)?;

    if nonce.is_empty() || cookie_value(headers, STATE_COOKIE) != Some(nonce) {
        return Err(SyncError::InvalidState);
    }
    if now.timestamp() - issued > STATE_TTL_SECS {
        return Err(SyncError::BadRequest("OAuth session expired".into()));
    }
    Ok(())
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}
