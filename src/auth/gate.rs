//! Request authentication: bearer token → verified claims → live user record.
//!
//! `require_auth` runs as route middleware and fails closed. On success the
//! caller's identity is stored in the request extensions, where handlers pick
//! it up through the [`AuthUser`] extractor and the cache layer reads it to
//! scope keys by owner.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::{jwt::JwtKeys, repo::UserStore, repo_types::User},
    error::AppError,
    state::AppState,
};

pub const BEARER_PREFIX: &str = "Bearer ";

/// Identity of the authenticated caller for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }
}

pub async fn authenticate(
    keys: &JwtKeys,
    users: &dyn UserStore,
    authorization: Option<&str>,
) -> Result<User, AppError> {
    let token = authorization
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .ok_or_else(|| AppError::Authentication("Could not validate token".into()))?;

    let claims = keys.verify(token).map_err(|e| {
        warn!(reason = %e, "token rejected");
        AppError::from(e)
    })?;

    let user = users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "token subject no longer exists");
            AppError::UserNotFound("User not found".into())
        })?;

    if !user.is_active {
        warn!(user_id = %user.id, "deactivated account presented a token");
        return Err(AppError::AccountDeactivated(
            "Account has been deactivated".into(),
        ));
    }

    Ok(user)
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let user = authenticate(&state.keys, state.users.as_ref(), authorization.as_deref()).await?;
    debug!(user_id = %user.id, "request authenticated");
    req.extensions_mut().insert(AuthUser::from(&user));
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Authentication("Could not validate token".into()))
    }
}
