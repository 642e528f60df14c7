// src/handlers/course.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        course::{
            ContainerRef, Course, CourseDetail, CourseListParams, CoursePage, CreateCourseRequest,
            CreateModuleRequest, ModuleDetail, NewCourse, NewModule, UpdateCourseRequest,
        },
        question::{AddQuestionsRequest, NewQuestion, Question, QuestionSummary},
        user::Role,
    },
    store::Store,
    utils::{
        html::{clean_html, clean_opt},
        jwt::Claims,
    },
};

const DEFAULT_COURSE_DURATION: u32 = 30;
const DEFAULT_MODULE_DURATION: u32 = 10;

pub(crate) async fn load_course(store: &dyn Store, id: i64) -> Result<Course, AppError> {
    store
        .find_course(id)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))
}

/// Course authors and admins may edit a course and everything inside it.
fn ensure_author(claims: &Claims, course: &Course) -> Result<(), AppError> {
    if claims.role == Role::Admin || claims.user_id()? == course.created_by {
        return Ok(());
    }
    Err(AppError::Unauthorized(
        "Only the course author or an admin can modify this course".to_string(),
    ))
}

pub async fn create_course(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let course = store
        .create_course(NewCourse {
            title: payload.title.trim().to_string(),
            description: clean_html(&payload.description),
            created_by: claims.user_id()?,
            category: payload.category,
            difficulty: payload.difficulty,
            target_age: payload.target_age,
            estimated_duration: payload.estimated_duration.unwrap_or(DEFAULT_COURSE_DURATION),
            tags: payload.tags.into_iter().map(|t| t.trim().to_lowercase()).collect(),
            is_published: payload.is_published,
            thumbnail_url: payload.thumbnail_url,
            passing_score: payload.passing_score.unwrap_or(config.course_passing_score),
        })
        .await?;

    tracing::info!("User {} created course {}", claims.sub, course.id);
    Ok((StatusCode::CREATED, Json(course)))
}

/// Published courses, newest first, with optional filters and pagination.
pub async fn list_courses(
    State(store): State<Arc<dyn Store>>,
    Query(params): Query<CourseListParams>,
) -> Result<impl IntoResponse, AppError> {
    let (data, total) = store.list_courses(&params).await?;
    let limit = u64::from(params.limit());

    Ok(Json(CoursePage {
        count: data.len(),
        total,
        page: params.page(),
        pages: total.div_ceil(limit),
        data,
    }))
}

/// Course with its ordered modules and question summaries (no answers).
pub async fn get_course(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = load_course(store.as_ref(), id).await?;

    let mut modules = Vec::new();
    for module in store.list_modules(id).await? {
        let quiz = store
            .list_questions(ContainerRef::Module(module.id))
            .await?
            .iter()
            .map(QuestionSummary::from)
            .collect();
        modules.push(ModuleDetail { module, quiz });
    }

    let quiz = store
        .list_questions(ContainerRef::Course(id))
        .await?
        .iter()
        .map(QuestionSummary::from)
        .collect();

    Ok(Json(CourseDetail { course, modules, quiz }))
}

pub async fn update_course(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(mut payload): Json<UpdateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let course = load_course(store.as_ref(), id).await?;
    ensure_author(&claims, &course)?;

    if let Some(age) = &payload.target_age {
        if age.min > age.max {
            return Err(AppError::BadRequest("target_age.min must not exceed target_age.max".to_string()));
        }
    }
    payload.title = payload.title.map(|t| t.trim().to_string());
    payload.description = clean_opt(payload.description);

    let course = store.update_course(id, payload).await?;
    Ok(Json(course))
}

pub async fn delete_course(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = load_course(store.as_ref(), id).await?;
    ensure_author(&claims, &course)?;

    store.delete_course(id).await?;
    tracing::info!("User {} deleted course {}", claims.sub, id);
    Ok(Json(json!({ "message": "Course deleted successfully" })))
}

pub async fn add_module(
    State(store): State<Arc<dyn Store>>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateModuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let course = load_course(store.as_ref(), course_id).await?;
    ensure_author(&claims, &course)?;

    let mut content = payload.content;
    content.text = clean_opt(content.text);

    let module = store
        .create_module(NewModule {
            course_id,
            title: payload.title.trim().to_string(),
            content,
            order: payload.order,
            module_type: payload.module_type,
            duration: payload.duration.unwrap_or(DEFAULT_MODULE_DURATION),
            learning_objectives: payload.learning_objectives,
            is_published: payload.is_published,
            passing_score: payload.passing_score.unwrap_or(config.module_passing_score),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(module)))
}

async fn add_questions(
    store: &dyn Store,
    claims: &Claims,
    container: ContainerRef,
    payload: AddQuestionsRequest,
) -> Result<(StatusCode, Json<Vec<Question>>), AppError> {
    payload.validate()?;

    let course_id = match container {
        ContainerRef::Course(id) => id,
        ContainerRef::Module(id) => {
            store
                .find_module(id)
                .await?
                .ok_or(AppError::NotFound("Module not found".to_string()))?
                .course_id
        }
    };
    let course = load_course(store, course_id).await?;
    ensure_author(claims, &course)?;

    let questions = payload.questions.into_iter().map(NewQuestion::from).collect();
    let created = store.add_questions(container, questions).await?;

    tracing::info!(
        "User {} added {} questions to {}:{}",
        claims.sub,
        created.len(),
        container.kind(),
        container.id()
    );
    Ok((StatusCode::CREATED, Json(created)))
}

/// Authors the course-level assessment.
pub async fn add_course_questions(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<AddQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    add_questions(store.as_ref(), &claims, ContainerRef::Course(id), payload).await
}

pub async fn add_module_questions(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<AddQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    add_questions(store.as_ref(), &claims, ContainerRef::Module(id), payload).await
}

/// Enrolls the calling student; progress starts at the first module.
pub async fn enroll(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let learner = claims.require_student()?;

    let course = load_course(store.as_ref(), id).await?;
    if !course.is_published {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    let first_module = store.list_modules(id).await?.first().map(|m| m.id);
    let progress = store.enroll(learner, id, first_module).await?;

    tracing::info!("Student {} enrolled in course {}", learner, id);
    Ok((StatusCode::CREATED, Json(progress)))
}

pub async fn get_progress(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let progress = store
        .get_progress(claims.user_id()?, id)
        .await?
        .ok_or(AppError::NotFound("Not enrolled in this course".to_string()))?;
    Ok(Json(progress))
}
