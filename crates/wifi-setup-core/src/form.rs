//! Decoding of the `application/x-www-form-urlencoded` setup submission.
//!
//! The body is split on `&`, each pair on its first `=`, and every value is
//! percent-decoded (`+` meaning space). Duplicate fields are rejected rather
//! than resolved, and `ssid`/`password` are required.
//!
//! Oversized `ssid` and `password` values are truncated to the limits the
//! form advertises through `maxlength`, on a UTF-8 character boundary.

use std::borrow::Cow;
use std::collections::HashMap;

use thiserror::Error;

use crate::model::{PASSWORD_MAX_LEN, SSID_MAX_LEN};

pub const FIELD_SETUP_PASSWORD: &str = "setup_pwd";
pub const FIELD_CSRF: &str = "csrf";
pub const FIELD_SSID: &str = "ssid";
pub const FIELD_PASSWORD: &str = "password";

/// Errors decoding a setup submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// A required field is absent.
    #[error("missing field `{0}`")]
    Missing(&'static str),

    /// A field appears more than once.
    #[error("duplicate field `{0}`")]
    Duplicate(String),

    /// A value does not decode to UTF-8 text.
    #[error("field `{0}` is not valid UTF-8")]
    InvalidEncoding(&'static str),
}

/// A decoded setup submission.
#[derive(Clone, PartialEq, Eq)]
pub struct SetupForm {
    /// Setup password typed by the user (empty when absent).
    pub setup_pwd: String,
    /// Anti-forgery token echoed from the hidden field (empty when absent).
    pub csrf: String,
    /// Target network name, possibly empty.
    pub ssid: String,
    /// Target network secret.
    pub password: String,
}

impl std::fmt::Debug for SetupForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupForm")
            .field("csrf", &self.csrf)
            .field("ssid", &self.ssid)
            .finish_non_exhaustive()
    }
}

impl SetupForm {
    /// Decode a raw request body.
    pub fn decode(body: &[u8]) -> Result<Self, FormError> {
        let fields = split_pairs(body)?;

        let text = |name: &'static str| -> Result<Option<String>, FormError> {
            match fields.get(name) {
                Some(raw) => percent_decode(raw)
                    .map(Some)
                    .ok_or(FormError::InvalidEncoding(name)),
                None => Ok(None),
            }
        };

        let ssid = text(FIELD_SSID)?.ok_or(FormError::Missing(FIELD_SSID))?;
        let password = text(FIELD_PASSWORD)?.ok_or(FormError::Missing(FIELD_PASSWORD))?;

        Ok(Self {
            setup_pwd: text(FIELD_SETUP_PASSWORD)?.unwrap_or_default(),
            csrf: text(FIELD_CSRF)?.unwrap_or_default(),
            ssid: truncate_utf8(ssid, SSID_MAX_LEN),
            password: truncate_utf8(password, PASSWORD_MAX_LEN),
        })
    }
}

fn split_pairs(body: &[u8]) -> Result<HashMap<String, &[u8]>, FormError> {
    let mut fields = HashMap::new();

    for pair in body.split(|b| *b == b'&').filter(|p| !p.is_empty()) {
        let (key, value) = match pair.iter().position(|b| *b == b'=') {
            Some(idx) => (&pair[..idx], &pair[idx + 1..]),
            None => (pair, &pair[pair.len()..]),
        };
        let key = String::from_utf8_lossy(key).into_owned();
        if fields.contains_key(&key) {
            return Err(FormError::Duplicate(key));
        }
        fields.insert(key, value);
    }

    Ok(fields)
}

/// Percent-decode a form value, treating `+` as a space.
///
/// Returns `None` when the decoded bytes are not UTF-8.
pub fn percent_decode(raw: &[u8]) -> Option<String> {
    let spaced: Vec<u8> = raw
        .iter()
        .map(|b| if *b == b'+' { b' ' } else { *b })
        .collect();
    let decoded: Cow<'_, [u8]> = urlencoding::decode_binary(&spaced);
    String::from_utf8(decoded.into_owned()).ok()
}

fn truncate_utf8(mut value: String, max_len: usize) -> String {
    if value.len() > max_len {
        let mut end = max_len;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        value.truncate(end);
    }
    value
}
