// src/handlers/auth.rs

use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{
        AuthResponse, ChangePasswordRequest, LoginRequest, MeResponse, NewUser, RefreshRequest,
        RegisterRequest, Role, UpdateProfileRequest, User, UserUpdate, normalize_email,
    },
    store::Store,
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, TokenKind, issue_token_pair, verify_jwt},
    },
};

fn auth_response(user: User, config: &Config) -> Result<AuthResponse, AppError> {
    let (access_token, refresh_token) = issue_token_pair(&user, config)?;
    Ok(AuthResponse {
        user,
        access_token,
        refresh_token,
        token_type: "Bearer",
    })
}

/// Loads the caller's account; a token for a deleted user is no longer valid.
pub(crate) async fn current_user(store: &dyn Store, claims: &Claims) -> Result<User, AppError> {
    store
        .find_user(claims.user_id()?)
        .await?
        .ok_or(AppError::AuthError("User no longer exists".to_string()))
}

/// Registers a teacher or admin account.
///
/// Student accounts are created by teachers, so `role: "student"` is refused.
/// Returns 201 Created with the user and a token pair.
pub async fn register(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let role = payload.role.unwrap_or(Role::Teacher);
    if role == Role::Student {
        return Err(AppError::Unauthorized(
            "Student registration is disabled. Ask your teacher for an account.".to_string(),
        ));
    }

    let email = normalize_email(&payload.email);
    if store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(format!("User '{}' already exists", email)));
    }

    let user = store
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            email,
            password_hash: hash_password(&payload.password)?,
            role,
            dob: None,
            class_standard: None,
            created_by: None,
        })
        .await?;

    tracing::info!("Registered {} account {}", user.role, user.id);
    Ok((StatusCode::CREATED, Json(auth_response(user, &config)?)))
}

/// Authenticates by email and password and returns a token pair.
pub async fn login(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = store
        .find_user_by_email(&normalize_email(&payload.email))
        .await?
        .ok_or(AppError::AuthError("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::AuthError("Invalid email or password".to_string()));
    }

    Ok(Json(auth_response(user, &config)?))
}

/// Exchanges a refresh token for a fresh pair.
pub async fn refresh(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_jwt(&payload.refresh_token, &config.jwt_refresh_secret, TokenKind::Refresh)?;
    let user = current_user(store.as_ref(), &claims).await?;
    Ok(Json(auth_response(user, &config)?))
}

/// Current user with course and game progress.
pub async fn me(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(store.as_ref(), &claims).await?;
    let course_progress = store.list_progress(user.id).await?;
    let game_progress = store.game_progress(user.id).await?;

    Ok(Json(MeResponse { user, course_progress, game_progress }))
}

pub async fn update_profile(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = store
        .update_user(
            claims.user_id()?,
            UserUpdate {
                name: payload.name.map(|n| n.trim().to_string()),
                region: payload.region,
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(user))
}

pub async fn change_password(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = current_user(store.as_ref(), &claims).await?;
    if !verify_password(&payload.current_password, &user.password_hash)? {
        return Err(AppError::BadRequest("Current password is incorrect".to_string()));
    }

    store
        .update_user(
            user.id,
            UserUpdate {
                password_hash: Some(hash_password(&payload.new_password)?),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!("User {} changed their password", user.id);
    Ok(Json(json!({ "message": "Password updated successfully" })))
}
