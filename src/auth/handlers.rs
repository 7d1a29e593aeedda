use axum::{
    extract::{FromRef, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            ConfirmRequest, ForgotPasswordRequest, ItemResponse, LoginRequest, MessageResponse,
            ResetPasswordRequest, SessionResponse, SignupRequest, SignupVariant, TokenQuery,
        },
        login, password_reset,
        password::PasswordPolicy,
        signup,
    },
    error::AuthError,
    state::AppState,
    users::{User, UserId},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup_standard))
        .route("/signup/early_access", post(signup_early_access))
        .route("/signup/pre_launch", post(signup_pre_launch))
        .route("/signup/:id/confirm", get(confirm_redirect).put(confirm))
        .route("/signup/early_access/:id/confirm", put(confirm_early_access))
        .route("/login", post(log_in))
        .route("/signin", post(log_in))
        .route("/password/forgot", post(forgot_password))
        .route("/password/:id/reset", put(reset_password))
}

// A missing or unparsable body is treated as an empty one.
fn body<T: Default>(payload: Option<Json<T>>) -> T {
    payload.map(|Json(p)| p).unwrap_or_default()
}

async fn signup_as(
    state: &AppState,
    variant: SignupVariant,
    payload: SignupRequest,
) -> Result<Json<ItemResponse<User>>, AuthError> {
    let form = payload.validate(variant, &PasswordPolicy::from_ref(state))?;
    let user = signup::signup(state, form).await?;
    Ok(Json(ItemResponse { item: user }))
}

#[instrument(skip(state, payload))]
pub async fn signup_standard(
    State(state): State<AppState>,
    payload: Option<Json<SignupRequest>>,
) -> Result<Json<ItemResponse<User>>, AuthError> {
    signup_as(&state, SignupVariant::Standard, body(payload)).await
}

#[instrument(skip(state, payload))]
pub async fn signup_early_access(
    State(state): State<AppState>,
    payload: Option<Json<SignupRequest>>,
) -> Result<Json<ItemResponse<User>>, AuthError> {
    signup_as(&state, SignupVariant::EarlyAccess, body(payload)).await
}

#[instrument(skip(state, payload))]
pub async fn signup_pre_launch(
    State(state): State<AppState>,
    payload: Option<Json<SignupRequest>>,
) -> Result<Json<ItemResponse<User>>, AuthError> {
    signup_as(&state, SignupVariant::PreLaunch, body(payload)).await
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn with_error_param(url: &str, kind: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}error={}", url, sep, kind)
}

/// Link target of the confirmation email; answers with a redirect.
#[instrument(skip(state, query))]
pub async fn confirm_redirect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Response {
    // Links are followed from mail clients, so a mangled id still redirects.
    let result = match (id.parse::<UserId>(), query.into_token()) {
        (Ok(user_id), Some(token)) => signup::confirm(&state, user_id, &token, None).await,
        _ => Err(AuthError::InvalidToken),
    };
    let config = &state.config.signup;
    match result {
        Ok(_) => found(&config.confirmation_redirect_url),
        Err(e) => {
            warn!(user_id = %id, error = %e, "confirmation link rejected");
            match &config.confirmation_error_redirect_url {
                Some(url) => found(&with_error_param(url, e.kind())),
                None => e.into_response(),
            }
        }
    }
}

#[instrument(skip(state, query, payload))]
pub async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Query(query): Query<TokenQuery>,
    payload: Option<Json<ConfirmRequest>>,
) -> Result<Json<ItemResponse<User>>, AuthError> {
    let payload = body(payload);
    let token = payload.token_or(query).ok_or(AuthError::InvalidToken)?;
    let user = signup::confirm(&state, id, &token, payload.password_pair()).await?;
    Ok(Json(ItemResponse { item: user }))
}

#[instrument(skip(state, query, payload))]
pub async fn confirm_early_access(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Query(query): Query<TokenQuery>,
    payload: Option<Json<ConfirmRequest>>,
) -> Result<Json<SessionResponse>, AuthError> {
    let payload = body(payload);
    let token = payload.token_or(query).ok_or(AuthError::InvalidToken)?;
    let (user, token) =
        signup::confirm_early_access(&state, id, &token, payload.password_pair()).await?;
    Ok(Json(SessionResponse { item: user, token }))
}

#[instrument(skip(state, payload))]
pub async fn log_in(
    State(state): State<AppState>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<SessionResponse>, AuthError> {
    let payload = body(payload);
    let session = login::login(&state, &payload.email, &payload.password).await?;
    Ok(Json(SessionResponse {
        item: session.user,
        token: session.token,
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    password_reset::request_reset(&state, &body(payload).email).await?;
    Ok(Json(MessageResponse {
        message: password_reset::RESET_REQUESTED_MESSAGE,
    }))
}

#[instrument(skip(state, query, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Query(query): Query<TokenQuery>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<Json<ItemResponse<User>>, AuthError> {
    let payload = body(payload);
    let token = payload.token_or(query).ok_or(AuthError::InvalidToken)?;
    let user = password_reset::reset(&state, id, &token, payload.password_pair()).await?;
    Ok(Json(ItemResponse { item: user }))
}
