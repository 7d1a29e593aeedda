use axum::extract::FromRef;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::auth::claims::ActionKind;
use crate::auth::dto::{PasswordPair, SignupForm, SignupVariant};
use crate::auth::jwt::SessionKeys;
use crate::auth::password::{hash_password, PasswordPolicy};
use crate::auth::tokens::TokenCodec;
use crate::error::AuthError;
use crate::notifications::NotificationKind;
use crate::state::AppState;
use crate::users::{NewUser, User, UserId};

fn invitation(variant: SignupVariant) -> NotificationKind {
    match variant {
        SignupVariant::EarlyAccess => NotificationKind::EarlyAccessInvitation,
        SignupVariant::Standard | SignupVariant::PreLaunch => NotificationKind::SignupConfirmation,
    }
}

/// Creates an unconfirmed account and mails the confirmation link.
///
/// The email is best-effort: the account exists whether or not it goes out.
pub async fn signup(state: &AppState, form: SignupForm) -> Result<User, AuthError> {
    let password_hash = form.password.as_deref().map(hash_password).transpose()?;

    let mut metadata = form.metadata;
    metadata.insert(
        "signup_variant".into(),
        Value::String(form.variant.as_str().into()),
    );

    let user = state
        .users
        .create(NewUser {
            email: form.email,
            first_name: form.first_name,
            last_name: form.last_name,
            password_hash,
            metadata: Some(metadata),
        })
        .await
        .map_err(|e| {
            if matches!(e, AuthError::DuplicateEmail) {
                warn!("signup with an email that is already registered");
            }
            e
        })?;
    info!(user_id = %user.id, email = %user.email, variant = form.variant.as_str(), "user signed up");

    match TokenCodec::from_ref(state).issue(&user, ActionKind::SignupConfirm) {
        Ok(token) => {
            state
                .notifier
                .send_best_effort(invitation(form.variant), &user, Some(&token))
                .await
        }
        Err(e) => error!(user_id = %user.id, error = %e, "could not issue confirmation token"),
    }
    Ok(user)
}

/// Confirms the account `user_id` with a signup-confirmation token.
///
/// An optional new password replaces the stored hash in the same update.
pub async fn confirm(
    state: &AppState,
    user_id: UserId,
    token: &str,
    password: Option<PasswordPair>,
) -> Result<User, AuthError> {
    if let Some(pair) = &password {
        PasswordPolicy::from_ref(state).check_pair(&pair.password, &pair.confirmation)?;
    }

    let users = state.users.clone();
    let user = TokenCodec::from_ref(state)
        .verify(token, ActionKind::SignupConfirm, |id| async move {
            if id != user_id {
                return Ok(None);
            }
            users.find_by_id(id).await
        })
        .await?;

    let password_hash = password
        .as_ref()
        .map(|pair| hash_password(&pair.password))
        .transpose()?;

    // A concurrent confirmation won the race.
    let confirmed = state
        .users
        .confirm(user.id, password_hash.as_deref())
        .await?
        .ok_or(AuthError::StaleToken)?;
    info!(user_id = %confirmed.id, "account confirmed");

    state
        .notifier
        .send_best_effort(NotificationKind::Welcome, &confirmed, None)
        .await;
    Ok(confirmed)
}

/// Early-access confirmation: the invitee picks a password and is logged in.
pub async fn confirm_early_access(
    state: &AppState,
    user_id: UserId,
    token: &str,
    password: Option<PasswordPair>,
) -> Result<(User, String), AuthError> {
    let password =
        password.ok_or_else(|| AuthError::Validation("password is required".into()))?;
    let user = confirm(state, user_id, token, Some(password)).await?;
    let session = SessionKeys::from_ref(state).sign(&user)?;
    Ok((user, session))
}
