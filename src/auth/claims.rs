use serde::{Deserialize, Serialize};

use crate::users::UserId;

/// What an action token authorizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    SignupConfirm,
    PasswordReset,
}

/// Payload of a confirmation / password-reset token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionClaims {
    pub sub: UserId,      // user ID
    pub act: ActionKind,  // what the token authorizes
    pub fpr: String,      // fingerprint of the state the token is bound to
    pub iat: u64,         // issued at (unix timestamp)
    pub exp: u64,         // expires at (unix timestamp)
    pub iss: String,      // issuer
    pub aud: String,      // audience
}

/// Payload of a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,
    pub id: UserId,
    pub email: String,
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}
