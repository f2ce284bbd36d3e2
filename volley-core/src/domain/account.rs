//! Account and session domain types for the auth gateway

use serde::{Deserialize, Serialize};

/// Credentials of a test account created during setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
}

/// Tokens held by a logged-in virtual user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Extracts the value of a named cookie from a `Set-Cookie` style header
///
/// Returns `None` when the cookie is absent or empty.
pub fn extract_cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
        .filter(|value| !value.is_empty())
}
