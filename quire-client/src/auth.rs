//! Bearer token handling.
//!
//! The API issues compact JWTs. Only the `exp` claim is read; the signature
//! is the server's business.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use quire_store::Session;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Login form of the API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Registration form of the API. Names are sent capitalized.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignUp {
    pub fn new(
        first_name: impl AsRef<str>,
        last_name: impl AsRef<str>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            first_name: capitalized(first_name.as_ref()),
            last_name: capitalized(last_name.as_ref()),
            email: email.into(),
            confirm_password: password.clone(),
            password,
        }
    }

    pub fn with_confirmation(mut self, confirm_password: impl Into<String>) -> Self {
        self.confirm_password = confirm_password.into();
        self
    }

    /// Rejects a form the server would refuse anyway.
    pub fn validate(&self) -> ClientResult<()> {
        for (field, value) in [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("email", &self.email),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                return Err(ClientError::InvalidForm(format!("{field} is required")));
            }
        }
        if self.password != self.confirm_password {
            return Err(ClientError::InvalidForm("passwords do not match".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SignUp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUp")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish_non_exhaustive()
    }
}

fn capitalized(name: &str) -> String {
    let mut chars = name.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// Builds a [`Session`] from a compact JWT, taking `expires_at` from its
/// `exp` claim (seconds since the epoch).
pub fn decode_session(token: &str) -> ClientResult<Session> {
    let expires_at = token_expiry(token)?;
    Ok(Session::new(token, expires_at))
}

/// Reads the `exp` claim of a compact JWT.
pub fn token_expiry(token: &str) -> ClientResult<DateTime<Utc>> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(ClientError::InvalidToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClientError::InvalidToken(format!("payload is not base64url: {e}")))?;
    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| ClientError::InvalidToken(format!("unreadable claims: {e}")))?;

    DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| ClientError::InvalidToken(format!("exp out of range: {}", claims.exp)))
}
