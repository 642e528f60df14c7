// src/handlers/students.rs

//! Student accounts, managed by the teachers who create them.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{
        CreateStudentRequest, NewUser, ResetPasswordRequest, Role, UpdateStudentRequest, User,
        UserUpdate, normalize_email,
    },
    store::Store,
    utils::{hash::hash_password, jwt::Claims},
};

/// Loads student `id` for a caller who must be its creator or an admin.
async fn owned_student(store: &dyn Store, claims: &Claims, id: i64) -> Result<User, AppError> {
    let student = store
        .find_user(id)
        .await?
        .filter(|u| u.role == Role::Student)
        .ok_or(AppError::NotFound("Student not found".to_string()))?;

    let caller = claims.user_id()?;
    if claims.role != Role::Admin && student.created_by != Some(caller) {
        return Err(AppError::Unauthorized(
            "You can only manage students you created".to_string(),
        ));
    }
    Ok(student)
}

/// Creates a student account owned by the calling teacher or admin.
pub async fn create_student(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    if store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(format!("User '{}' already exists", email)));
    }

    let student = store
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            email,
            password_hash: hash_password(&payload.password)?,
            role: Role::Student,
            dob: Some(payload.dob),
            class_standard: Some(payload.class_standard.trim().to_string()),
            created_by: Some(claims.user_id()?),
        })
        .await?;

    tracing::info!("User {} created student {}", claims.sub, student.id);
    Ok((StatusCode::CREATED, Json(student)))
}

/// Students created by the caller.
pub async fn my_students(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let students = store.list_students(Some(claims.user_id()?)).await?;
    Ok(Json(students))
}

/// Every student on the platform. Admin only.
pub async fn list_students(State(store): State<Arc<dyn Store>>) -> Result<impl IntoResponse, AppError> {
    let students = store.list_students(None).await?;
    Ok(Json(students))
}

pub async fn update_student(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    owned_student(store.as_ref(), &claims, id).await?;

    let student = store
        .update_user(
            id,
            UserUpdate {
                name: payload.name.map(|n| n.trim().to_string()),
                email: payload.email.as_deref().map(normalize_email),
                dob: payload.dob,
                class_standard: payload.class_standard.map(|c| c.trim().to_string()),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(student))
}

pub async fn delete_student(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    owned_student(store.as_ref(), &claims, id).await?;

    if !store.delete_user(id).await? {
        return Err(AppError::NotFound("Student not found".to_string()));
    }

    tracing::info!("User {} deleted student {}", claims.sub, id);
    Ok(Json(json!({ "message": "Student deleted successfully" })))
}

pub async fn reset_password(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    owned_student(store.as_ref(), &claims, id).await?;

    store
        .update_user(
            id,
            UserUpdate {
                password_hash: Some(hash_password(&payload.new_password)?),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(json!({ "message": "Password reset successfully" })))
}
