//! Auth gateway DTOs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub nickname: String,
}

impl SignupRequest {
    /// Builds the signup body used for generated test accounts
    pub fn for_test_user(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            email: format!("{}@test.com", username),
            nickname: format!("test_{}", username),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    pub username: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login body; either token may be missing when the gateway only sets cookies
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}
