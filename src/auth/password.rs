use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::extract::FromRef;
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

use crate::error::AuthError;
use crate::state::AppState;

lazy_static! {
    // Verified against when the account has no usable hash, so every login
    // attempt pays for one Argon2 verification.
    static ref DUMMY_HASH: Option<String> = hash_password("dummy-password-for-timing").ok();
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Checks `plain` against an optional stored hash.
///
/// A missing or unparsable hash yields `false` after burning a dummy
/// verification.
pub fn verify_stored(plain: &str, stored: Option<&str>) -> bool {
    match stored.map(|hash| verify_password(plain, hash)) {
        Some(Ok(ok)) => ok,
        _ => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(plain, dummy);
            }
            false
        }
    }
}

/// Strength policy for user-chosen passwords: a minimum length, at least
/// one letter and at least one digit or symbol.
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl FromRef<AppState> for PasswordPolicy {
    fn from_ref(state: &AppState) -> Self {
        Self {
            min_length: state.config.signup.password_min_length,
        }
    }
}

impl PasswordPolicy {
    pub fn check(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.min_length {
            return Err(AuthError::WeakPassword(format!(
                "Password must be at least {} characters long",
                self.min_length
            )));
        }
        let has_letter = password.chars().any(char::is_alphabetic);
        let has_other = password.chars().any(|c| !c.is_alphabetic());
        if !(has_letter && has_other) {
            return Err(AuthError::WeakPassword(
                "Password must contain letters and at least one digit or symbol".into(),
            ));
        }
        Ok(())
    }

    /// Confirmation match first, then strength.
    pub fn check_pair(&self, password: &str, confirmation: &str) -> Result<(), AuthError> {
        if password != confirmation {
            return Err(AuthError::PasswordMismatch);
        }
        self.check(password)
    }
}
