use axum::extract::FromRef;
use tracing::{debug, info};

use crate::auth::claims::ActionKind;
use crate::auth::dto::{is_valid_email, normalize_email, PasswordPair};
use crate::auth::password::{hash_password, PasswordPolicy};
use crate::auth::tokens::TokenCodec;
use crate::error::AuthError;
use crate::notifications::NotificationKind;
use crate::state::AppState;
use crate::users::{User, UserId};

/// Returned by the forgot-password endpoint whether or not the email exists.
pub const RESET_REQUESTED_MESSAGE: &str =
    "An email with a password reset link was sent to your inbox";

/// Mails a reset link when `email` belongs to an account.
///
/// Unknown or malformed addresses succeed silently. A delivery failure for
/// a known account is returned to the caller.
pub async fn request_reset(state: &AppState, email: &str) -> Result<(), AuthError> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        debug!("password reset requested for a malformed email");
        return Ok(());
    }
    let Some(user) = state.users.find_by_email(&email).await? else {
        debug!("password reset requested for an unknown email");
        return Ok(());
    };

    let token = TokenCodec::from_ref(state).issue(&user, ActionKind::PasswordReset)?;
    state
        .notifier
        .send(NotificationKind::PasswordReset, &user, Some(&token))
        .await?;
    info!(user_id = %user.id, "password reset email sent");
    Ok(())
}

/// Replaces the password of `user_id` using a reset token.
///
/// The token is bound to the hash it was issued against, so it works once.
pub async fn reset(
    state: &AppState,
    user_id: UserId,
    token: &str,
    password: PasswordPair,
) -> Result<User, AuthError> {
    PasswordPolicy::from_ref(state).check_pair(&password.password, &password.confirmation)?;

    let users = state.users.clone();
    let user = TokenCodec::from_ref(state)
        .verify(token, ActionKind::PasswordReset, |id| async move {
            if id != user_id {
                return Ok(None);
            }
            users.find_by_id(id).await
        })
        .await?;

    let new_hash = hash_password(&password.password)?;
    let updated = state
        .users
        .set_password_hash(user.id, &new_hash, user.password_hash.as_deref())
        .await?
        .ok_or(AuthError::StaleToken)?;
    info!(user_id = %updated.id, "password reset");
    Ok(updated)
}
