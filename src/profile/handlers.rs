use axum::{extract::State, routing::get, Json, Router};
use tracing::{info, instrument, warn};

use crate::{
    auth::{dto::ItemResponse, jwt::AuthUser},
    error::AuthError,
    state::AppState,
    users::User,
};

use super::dto::UpdateProfileRequest;

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile).put(update_profile))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ItemResponse<User>>, AuthError> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(user_id = %user_id, "session for a deleted user");
        AuthError::Unauthorized("User not found")
    })?;
    Ok(Json(ItemResponse { item: user }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Option<Json<UpdateProfileRequest>>,
) -> Result<Json<ItemResponse<User>>, AuthError> {
    let changes = payload.map(|Json(p)| p).unwrap_or_default().validate()?;
    let user = state
        .users
        .update_profile(user_id, changes)
        .await?
        .ok_or(AuthError::Unauthorized("User not found"))?;
    info!(user_id = %user.id, "profile updated");
    Ok(Json(ItemResponse { item: user }))
}
