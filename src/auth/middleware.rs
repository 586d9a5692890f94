use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::jwt::JwtKeys;
use crate::error::ApiError;

/// Identity of the caller, attached by [`require_bearer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: Uuid,
}

/// Rejects the request with 401 unless it carries a valid `Bearer` token.
pub async fn require_bearer(
    State(keys): State<Arc<JwtKeys>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate(&keys, request.headers())?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn authenticate(keys: &JwtKeys, headers: &HeaderMap) -> Result<CurrentUser, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        debug!("missing Authorization header");
        return Err(ApiError::unauthorized());
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!("malformed Authorization header");
            ApiError::unauthorized()
        })?;

    let claims = keys.validate(token).map_err(|e| {
        warn!(reason = %e, "bearer token rejected");
        ApiError::unauthorized()
    })?;

    let user_id = Uuid::parse_str(&claims.user_id).map_err(|_| {
        warn!("token subject is not a user id");
        ApiError::unauthorized()
    })?;

    Ok(CurrentUser { user_id })
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or_else(ApiError::unauthorized)
    }
}
