use serde::{Deserialize, Serialize};

/// Body of `POST /api/token/`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Success body of `POST /api/token/`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Body of `POST /api/token/refresh/`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Success body of `POST /api/token/refresh/`.
/// `refresh` is only present when the server rotates refresh tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResult {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Body of `POST /api/registro/`.
#[derive(Debug, Clone, Serialize)]
pub struct Registration<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub password2: &'a str,
}

/// Field errors returned when registration is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationErrors {
    #[serde(default)]
    pub email: Vec<String>,
    #[serde(default)]
    pub password: Vec<String>,
    #[serde(default)]
    pub non_field_errors: Vec<String>,
}

impl RegistrationErrors {
    /// First message, checking email, then password, then general errors.
    pub fn first_message(&self) -> Option<&str> {
        self.email
            .first()
            .or_else(|| self.password.first())
            .or_else(|| self.non_field_errors.first())
            .map(String::as_str)
    }
}
