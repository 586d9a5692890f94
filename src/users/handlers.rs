use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use tokio::time::Instant;
use tracing::{instrument, warn};

use super::dto::{CreateUserRequest, LoginRequest, LoginResponse, UserResponse};
use crate::{
    auth::{
        jwt::JwtKeys,
        middleware::{require_bearer, CurrentUser},
    },
    error::ApiError,
    state::AppState,
};

pub fn user_routes(keys: Arc<JwtKeys>) -> Router<AppState> {
    let protected = Router::new()
        .route("/users/:id", get(get_user))
        .route_layer(from_fn_with_state(keys, require_bearer));

    Router::new()
        .route("/users", post(create_user))
        .route("/users/login", post(login))
        .merge(protected)
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    // The rejection text can echo request fields, so only the status is logged.
    warn!(status = %rejection.status(), "invalid request body");
    ApiError::bad_request("invalid request body")
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(payload) = payload.map_err(bad_body)?;

    if let Err(reason) = payload.validate() {
        warn!(%reason, "create user rejected");
        return Err(ApiError::bad_request(reason));
    }

    let deadline = Instant::now() + state.config.timeouts.write;
    let user = state.users.create_user(payload.into(), deadline).await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::bad_request("user id is required"));
    }

    let deadline = Instant::now() + state.config.timeouts.read;
    match state.users.get_user_by_id(&id, deadline).await? {
        Some(user) => Ok(Json(user.into())),
        None => Err(ApiError::not_found("user not found")),
    }
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(payload) = payload.map_err(bad_body)?;

    if payload.email.trim().is_empty() || payload.password.is_empty() {
        warn!("login without email or password");
        return Err(ApiError::bad_request("email and password are required"));
    }

    let deadline = Instant::now() + state.config.timeouts.write;
    let token = state
        .users
        .login(&payload.email, &payload.password, deadline)
        .await?;

    Ok(Json(LoginResponse { token }))
}
