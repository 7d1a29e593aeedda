use axum::extract::FromRef;
use tracing::{info, warn};

use crate::auth::dto::{is_valid_email, normalize_email};
use crate::auth::jwt::SessionKeys;
use crate::auth::password::verify_stored;
use crate::error::AuthError;
use crate::state::AppState;
use crate::users::User;

/// An authenticated user and their session token.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Exchanges credentials for a session token.
///
/// Unknown email, missing hash and wrong password are indistinguishable to
/// the caller. Valid credentials on an unconfirmed account are refused.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<Session, AuthError> {
    let email = normalize_email(email);
    let user = if is_valid_email(&email) {
        state.users.find_by_email(&email).await?
    } else {
        None
    };

    let matches = verify_stored(password, user.as_ref().and_then(|u| u.password_hash.as_deref()));
    let user = match user {
        Some(user) if matches => user,
        Some(user) => {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }
        None => {
            warn!("login unknown email");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !user.confirmed {
        warn!(user_id = %user.id, "login before confirmation");
        return Err(AuthError::AccountNotConfirmed);
    }

    let token = SessionKeys::from_ref(state).sign(&user)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Session { user, token })
}
