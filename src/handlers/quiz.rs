// src/handlers/quiz.rs

//! Quiz delivery, attempt submission and attempt history.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State, rejection::JsonRejection},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    handlers::course::load_course,
    models::{
        attempt::{AttemptResponse, SubmitAttemptRequest},
        course::ContainerRef,
        question::PublicQuestion,
    },
    services::evaluator::AttemptEvaluator,
    store::Store,
    utils::jwt::Claims,
};

const LEADERBOARD_SIZE: u32 = 10;

async fn public_quiz(store: &dyn Store, container: ContainerRef) -> Result<Vec<PublicQuestion>, AppError> {
    match container {
        ContainerRef::Course(id) => {
            load_course(store, id).await?;
        }
        ContainerRef::Module(id) => {
            store
                .find_module(id)
                .await?
                .ok_or(AppError::NotFound("Module not found".to_string()))?;
        }
    }
    let questions = store.list_questions(container).await?;
    Ok(questions.iter().map(PublicQuestion::from).collect())
}

/// Course-level assessment, without answers.
pub async fn get_course_quiz(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(public_quiz(store.as_ref(), ContainerRef::Course(id)).await?))
}

pub async fn get_module_quiz(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(public_quiz(store.as_ref(), ContainerRef::Module(id)).await?))
}

async fn submit(
    evaluator: &AttemptEvaluator,
    claims: &Claims,
    container: ContainerRef,
    payload: Result<Json<SubmitAttemptRequest>, JsonRejection>,
) -> Result<Json<AttemptResponse>, AppError> {
    let learner = claims.require_student()?;
    let Json(submission) = payload?;

    let evaluation = evaluator.evaluate(container, learner, submission).await?;
    Ok(Json(evaluation.into()))
}

/// Grades and records an attempt at the course-level assessment.
pub async fn submit_course_quiz(
    State(evaluator): State<AttemptEvaluator>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    payload: Result<Json<SubmitAttemptRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    submit(&evaluator, &claims, ContainerRef::Course(id), payload).await
}

/// Grades and records an attempt at a module quiz.
pub async fn submit_module_quiz(
    State(evaluator): State<AttemptEvaluator>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    payload: Result<Json<SubmitAttemptRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    submit(&evaluator, &claims, ContainerRef::Module(id), payload).await
}

pub async fn course_attempts(
    State(evaluator): State<AttemptEvaluator>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = evaluator.history(ContainerRef::Course(id), claims.user_id()?).await?;
    Ok(Json(attempts))
}

pub async fn module_attempts(
    State(evaluator): State<AttemptEvaluator>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = evaluator.history(ContainerRef::Module(id), claims.user_id()?).await?;
    Ok(Json(attempts))
}

pub async fn best_module_attempt(
    State(evaluator): State<AttemptEvaluator>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let best = evaluator
        .best_attempt(ContainerRef::Module(id), claims.user_id()?)
        .await?
        .ok_or(AppError::NotFound("No attempts yet".to_string()))?;
    Ok(Json(best))
}

/// Top learners by cumulative score.
pub async fn get_leaderboard(State(store): State<Arc<dyn Store>>) -> Result<impl IntoResponse, AppError> {
    let leaderboard = store.leaderboard(LEADERBOARD_SIZE).await?;
    Ok(Json(leaderboard))
}
