use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::password::PasswordPolicy;
use crate::error::AuthError;
use crate::users::{Metadata, User};

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Which signup flow created the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupVariant {
    Standard,
    EarlyAccess,
    PreLaunch,
}

impl SignupVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            SignupVariant::Standard => "standard",
            SignupVariant::EarlyAccess => "early_access",
            SignupVariant::PreLaunch => "pre_launch",
        }
    }
}

/// Request body for the three signup routes.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
    pub metadata: Option<Metadata>,
}

/// A signup request that passed validation.
#[derive(Debug, Clone)]
pub struct SignupForm {
    pub variant: SignupVariant,
    pub email: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub metadata: Metadata,
}

impl SignupRequest {
    pub fn validate(
        self,
        variant: SignupVariant,
        policy: &PasswordPolicy,
    ) -> Result<SignupForm, AuthError> {
        let email = normalize_email(self.email.as_deref().unwrap_or(""));
        if !is_valid_email(&email) {
            return Err(AuthError::Validation("Invalid email".into()));
        }
        let first_name = non_empty(self.first_name)
            .ok_or_else(|| AuthError::Validation("first_name is required".into()))?;

        let password = match variant {
            SignupVariant::Standard => {
                let password = self
                    .password
                    .ok_or_else(|| AuthError::Validation("password is required".into()))?;
                policy.check_pair(&password, self.password_confirmation.as_deref().unwrap_or(""))?;
                Some(password)
            }
            SignupVariant::EarlyAccess | SignupVariant::PreLaunch => None,
        };

        Ok(SignupForm {
            variant,
            email,
            first_name,
            last_name: non_empty(self.last_name),
            password,
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

impl TokenQuery {
    pub fn into_token(self) -> Option<String> {
        non_empty(self.token)
    }
}

/// New password with its confirmation.
#[derive(Debug, Clone)]
pub struct PasswordPair {
    pub password: String,
    pub confirmation: String,
}

/// Request body for `PUT /signup/:id/confirm` and the early-access variant.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfirmRequest {
    pub token: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

impl ConfirmRequest {
    /// `None` when neither field was sent.
    pub fn password_pair(&self) -> Option<PasswordPair> {
        if self.password.is_none() && self.password_confirmation.is_none() {
            return None;
        }
        Some(PasswordPair {
            password: self.password.clone().unwrap_or_default(),
            confirmation: self.password_confirmation.clone().unwrap_or_default(),
        })
    }

    /// Body token wins over the query string.
    pub fn token_or(&self, query: TokenQuery) -> Option<String> {
        non_empty(self.token.clone()).or_else(|| query.into_token())
    }
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub password: String,
    pub password_confirmation: String,
}

impl ResetPasswordRequest {
    pub fn token_or(&self, query: TokenQuery) -> Option<String> {
        non_empty(self.token.clone()).or_else(|| query.into_token())
    }

    pub fn password_pair(&self) -> PasswordPair {
        PasswordPair {
            password: self.password.clone(),
            confirmation: self.password_confirmation.clone(),
        }
    }
}

/// `{ "item": ... }`
#[derive(Debug, Serialize)]
pub struct ItemResponse<T> {
    pub item: T,
}

/// `{ "item": ..., "token": ... }`, returned when a session is established.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub item: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
