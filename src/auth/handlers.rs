use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        gate::AuthUser,
        password::{hash_password, verify_password},
        repo::UserConflict,
        repo_types::NewUser,
    },
    error::AppError,
    response::ApiResponse,
    state::AppState,
};

const REGISTER_FIELDS_MESSAGE: &str =
    "username, email and password are required and must be strings";
const LOGIN_FIELDS_MESSAGE: &str = "email and password are required and must be strings";
const WEAK_PASSWORD_MESSAGE: &str = "Password is not valid, must be at least 8 digits long, must contain alpha numeric characters";
const BAD_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let fields = payload.ok().and_then(|Json(p)| match (p.username, p.email, p.password) {
        (Some(u), Some(e), Some(pw)) => Some((u, e, pw)),
        _ => None,
    });
    let Some((username, email, password)) = fields else {
        return Err(AppError::Validation(REGISTER_FIELDS_MESSAGE.into()));
    };

    let username = username.trim().to_string();
    let email = email.trim().to_lowercase();
    if username.is_empty() {
        return Err(AppError::Validation(REGISTER_FIELDS_MESSAGE.into()));
    }

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Invalid email format".into()));
    }

    if !is_strong_password(&password) {
        warn!("password too weak");
        return Err(AppError::Validation(WEAK_PASSWORD_MESSAGE.into()));
    }

    if let Some(existing) = state.users.find_conflict(&email, &username).await? {
        warn!(email = %email, username = %username, "registration conflict");
        let conflict = if existing.email == email {
            UserConflict::Email
        } else {
            UserConflict::Username
        };
        return Err(AppError::Conflict(conflict.to_string()));
    }

    let password_hash = hash_password(&password).await?;
    let user = state
        .users
        .create(NewUser {
            username,
            email,
            password_hash,
        })
        .await
        .map_err(|e| match e.downcast_ref::<UserConflict>().copied() {
            // lost a race with a concurrent registration
            Some(conflict) => {
                warn!(conflict = %conflict, "registration conflict on insert");
                AppError::Conflict(conflict.to_string())
            }
            None => AppError::Internal(e),
        })?;
    let token = state.keys.issue(&user)?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "User registered successfully".into(),
            data: PublicUser::from(&user),
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let fields = payload.ok().and_then(|Json(p)| p.email.zip(p.password));
    let Some((email, password)) = fields else {
        return Err(AppError::Validation(LOGIN_FIELDS_MESSAGE.into()));
    };
    let email = email.trim().to_lowercase();

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::Authentication(BAD_CREDENTIALS_MESSAGE.into()));
    };

    if !user.is_active {
        warn!(user_id = %user.id, "login on deactivated account");
        return Err(AppError::AccountDeactivated(
            "Account has been deactivated".into(),
        ));
    }

    if !verify_password(&password, &user.password_hash).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Authentication(BAD_CREDENTIALS_MESSAGE.into()));
    }

    if let Err(e) = state.users.touch_last_login(user.id).await {
        warn!(error = %e, user_id = %user.id, "failed to record last login");
    }

    let token = state.keys.issue(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        success: true,
        message: "User logged in successfully".into(),
        data: PublicUser::from(&user),
        token,
    }))
}

/// Tokens are stateless, so logging out is the client discarding its token.
pub async fn logout() -> Json<ApiResponse<()>> {
    Json(ApiResponse::message(
        "Logged out successfully. Please remove token from client",
    ))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let user = state
        .users
        .find_by_id(auth.id)
        .await?
        .ok_or_else(|| AppError::UserNotFound("User not found".into()))?;
    Ok(Json(ApiResponse::ok(
        PublicUser::from(&user),
        "Profile retrieved successfully",
    )))
}
