use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl AuthResponse {
    #[must_use]
    pub const fn ok() -> Self {
        Self { success: true, message: None, token: None }
    }

    #[must_use]
    pub const fn with_token(token: String) -> Self {
        Self { success: true, message: None, token: Some(token) }
    }
}
