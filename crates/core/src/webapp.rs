//! Telegram Mini App sign-in.
//!
//! The client sends the raw `initData` query string. Its `hash` field is
//! HMAC-SHA256 over the remaining fields, sorted by key and joined as
//! `key=value` lines, keyed with HMAC-SHA256("WebAppData", bot token).

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const WEB_APP_KEY: &[u8] = b"WebAppData";
const COMPARE_KEY: &[u8] = b"storytime-secret-compare";

pub const MAX_INIT_DATA_AGE_SECS: i64 = 86_400;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InitDataError {
    #[error("init data is empty")]
    Empty,
    #[error("init data has no hash")]
    MissingHash,
    #[error("init data hash does not match")]
    HashMismatch,
    #[error("init data has no valid auth_date")]
    MissingAuthDate,
    #[error("init data is older than {max_age_secs}s")]
    Expired { max_age_secs: i64 },
    #[error("init data has no valid user: {0}")]
    InvalidUser(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WebAppUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedInitData {
    pub user: WebAppUser,
    pub auth_date: i64,
}

/// Checks the signature and freshness of `raw` and returns the signed-in user.
/// Allow-list membership is left to the caller.
pub fn verify_init_data(
    raw: &str,
    bot_token: &str,
    now_unix: i64,
) -> Result<VerifiedInitData, InitDataError> {
    if raw.trim().is_empty() {
        return Err(InitDataError::Empty);
    }

    let mut fields = parse_fields(raw);
    let hash = fields.remove("hash").filter(|hash| !hash.is_empty()).ok_or(InitDataError::MissingHash)?;
    let presented = decode_hex(&hash).ok_or(InitDataError::HashMismatch)?;

    let secret = keyed_mac(WEB_APP_KEY, bot_token.as_bytes())?.finalize().into_bytes();
    keyed_mac(&secret, data_check_string(&fields).as_bytes())?
        .verify_slice(&presented)
        .map_err(|_| InitDataError::HashMismatch)?;

    let auth_date = fields
        .get("auth_date")
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or(InitDataError::MissingAuthDate)?;
    if now_unix - auth_date > MAX_INIT_DATA_AGE_SECS {
        return Err(InitDataError::Expired { max_age_secs: MAX_INIT_DATA_AGE_SECS });
    }

    let raw_user =
        fields.get("user").ok_or_else(|| InitDataError::InvalidUser("missing".to_string()))?;
    let user: WebAppUser = serde_json::from_str(raw_user)
        .map_err(|error| InitDataError::InvalidUser(error.to_string()))?;

    Ok(VerifiedInitData { user, auth_date })
}

/// Builds a signed `initData` query string, as Telegram would for these fields.
pub fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> Result<String, InitDataError> {
    let sorted: BTreeMap<String, String> = fields
        .iter()
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();
    let secret = keyed_mac(WEB_APP_KEY, bot_token.as_bytes())?.finalize().into_bytes();
    let tag = keyed_mac(&secret, data_check_string(&sorted).as_bytes())?.finalize().into_bytes();

    Ok(url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(sorted.iter())
        .append_pair("hash", &encode_hex(&tag))
        .finish())
}

/// Equality check for shared secrets whose timing does not depend on where
/// the inputs first differ.
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    let (Ok(expected), Ok(presented)) = (
        keyed_mac(COMPARE_KEY, expected.as_bytes()),
        keyed_mac(COMPARE_KEY, presented.as_bytes()),
    ) else {
        return false;
    };
    presented.verify_slice(&expected.finalize().into_bytes()).is_ok()
}

fn parse_fields(raw: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        fields.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    fields
}

fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields.iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>().join("\n")
}

fn keyed_mac(key: &[u8], payload: &[u8]) -> Result<HmacSha256, InitDataError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| InitDataError::HashMismatch)?;
    mac.update(payload);
    Ok(mac)
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len()).step_by(2).map(|at| u8::from_str_radix(&text[at..at + 2], 16).ok()).collect()
}
