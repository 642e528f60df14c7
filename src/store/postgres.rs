// src/store/postgres.rs

//! Postgres backend. Schema lives in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction, types::Json};

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptStatus, GradedAnswer, NewAttempt},
        course::{
            AgeRange, ContainerRef, Course, CourseListParams, Module, ModuleContent, NewCourse,
            NewModule, UpdateCourseRequest,
        },
        progress::{CourseProgress, GameProgress, GameType, GameUpdate, SubUnit},
        question::{NewQuestion, Question, QuestionKind},
        user::{LeaderboardEntry, NewUser, Region, Role, User, UserUpdate},
    },
    store::{AttemptTx, Store},
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// Unit-like enums are stored by their serde names.

fn to_text<T: Serialize>(value: &T) -> Result<String, AppError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(AppError::InternalServerError(format!("Expected a string enum, got {}", other))),
        Err(e) => Err(AppError::InternalServerError(e.to_string())),
    }
}

fn from_text<T: DeserializeOwned>(column: &str, value: String) -> Result<T, AppError> {
    serde_json::from_value(serde_json::Value::String(value))
        .map_err(|e| AppError::InternalServerError(format!("Bad {} value: {}", column, e)))
}

fn to_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn from_int(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn container_parts(container: ContainerRef) -> (&'static str, i64) {
    (container.kind(), container.id())
}

fn parse_container(kind: &str, id: i64) -> Result<ContainerRef, AppError> {
    ContainerRef::from_parts(kind, id)
        .ok_or_else(|| AppError::InternalServerError(format!("Bad container kind '{}'", kind)))
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, dob, class_standard, created_by, region, total_score, created_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    dob: Option<NaiveDate>,
    class_standard: Option<String>,
    created_by: Option<i64>,
    region: Option<Json<Region>>,
    total_score: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse::<Role>().map_err(AppError::InternalServerError)?,
            dob: row.dob,
            class_standard: row.class_standard,
            created_by: row.created_by,
            region: row.region.map(|r| r.0),
            total_score: row.total_score,
            created_at: row.created_at,
        })
    }
}

const COURSE_COLUMNS: &str = "c.id, c.title, c.description, c.created_by, c.category, c.difficulty, \
    c.target_age, c.estimated_duration, c.tags, c.is_published, c.thumbnail_url, c.passing_score, c.created_at, \
    (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrolled_count";

#[derive(sqlx::FromRow)]
struct CourseRow {
    id: i64,
    title: String,
    description: String,
    created_by: i64,
    category: String,
    difficulty: String,
    target_age: Json<AgeRange>,
    estimated_duration: i32,
    tags: Json<Vec<String>>,
    is_published: bool,
    thumbnail_url: Option<String>,
    passing_score: f64,
    created_at: DateTime<Utc>,
    enrolled_count: i64,
}

impl TryFrom<CourseRow> for Course {
    type Error = AppError;

    fn try_from(row: CourseRow) -> Result<Self, Self::Error> {
        Ok(Course {
            id: row.id,
            title: row.title,
            description: row.description,
            created_by: row.created_by,
            category: from_text("category", row.category)?,
            difficulty: from_text("difficulty", row.difficulty)?,
            target_age: row.target_age.0,
            estimated_duration: from_int(row.estimated_duration),
            tags: row.tags.0,
            is_published: row.is_published,
            thumbnail_url: row.thumbnail_url,
            passing_score: row.passing_score,
            enrolled_count: u32::try_from(row.enrolled_count).unwrap_or(u32::MAX),
            created_at: row.created_at,
        })
    }
}

const MODULE_COLUMNS: &str = "id, course_id, title, content, sort_order, module_type, duration, \
    learning_objectives, is_published, passing_score, created_at";

#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: i64,
    course_id: i64,
    title: String,
    content: Json<ModuleContent>,
    sort_order: i32,
    module_type: String,
    duration: i32,
    learning_objectives: Json<Vec<String>>,
    is_published: bool,
    passing_score: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ModuleRow> for Module {
    type Error = AppError;

    fn try_from(row: ModuleRow) -> Result<Self, Self::Error> {
        Ok(Module {
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            content: row.content.0,
            order: row.sort_order,
            module_type: from_text("module_type", row.module_type)?,
            duration: from_int(row.duration),
            learning_objectives: row.learning_objectives.0,
            is_published: row.is_published,
            passing_score: row.passing_score,
            created_at: row.created_at,
        })
    }
}

const QUESTION_COLUMNS: &str = "id, container_kind, container_id, question_text, body, explanation, \
    marks, difficulty, sort_order, image_url, time_limit, created_at";

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    container_kind: String,
    container_id: i64,
    question_text: String,
    body: Json<QuestionKind>,
    explanation: Option<String>,
    marks: i32,
    difficulty: String,
    sort_order: i32,
    image_url: Option<String>,
    time_limit: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            container: parse_container(&row.container_kind, row.container_id)?,
            question_text: row.question_text,
            kind: row.body.0,
            explanation: row.explanation,
            marks: from_int(row.marks),
            difficulty: from_text("difficulty", row.difficulty)?,
            order: row.sort_order,
            image_url: row.image_url,
            time_limit: from_int(row.time_limit),
            created_at: row.created_at,
        })
    }
}

const PROGRESS_COLUMNS: &str =
    "user_id, course_id, completed, current_module, progress_percentage, enrolled_at, updated_at";

#[derive(sqlx::FromRow)]
struct ProgressRow {
    user_id: i64,
    course_id: i64,
    completed: Json<Vec<SubUnit>>,
    current_module: Option<i64>,
    progress_percentage: f64,
    enrolled_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProgressRow> for CourseProgress {
    fn from(row: ProgressRow) -> Self {
        CourseProgress {
            user_id: row.user_id,
            course_id: row.course_id,
            completed: row.completed.0,
            current_module: row.current_module,
            progress_percentage: row.progress_percentage,
            enrolled_at: row.enrolled_at,
            updated_at: row.updated_at,
        }
    }
}

const ATTEMPT_COLUMNS: &str = "id, user_id, container_kind, container_id, course_id, answers, score, \
    total_marks, percentage, passed, passing_score, attempt_number, time_taken, status, feedback, \
    started_at, submitted_at";

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: i64,
    user_id: i64,
    container_kind: String,
    container_id: i64,
    course_id: i64,
    answers: Json<Vec<GradedAnswer>>,
    score: i32,
    total_marks: i32,
    percentage: f64,
    passed: bool,
    passing_score: f64,
    attempt_number: i32,
    time_taken: i32,
    status: String,
    feedback: String,
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let status = AttemptStatus::parse(&row.status)
            .ok_or_else(|| AppError::InternalServerError(format!("Bad attempt status '{}'", row.status)))?;
        Ok(Attempt {
            id: row.id,
            record: NewAttempt {
                user_id: row.user_id,
                container: parse_container(&row.container_kind, row.container_id)?,
                course_id: row.course_id,
                answers: row.answers.0,
                score: from_int(row.score),
                total_marks: from_int(row.total_marks),
                percentage: row.percentage,
                passed: row.passed,
                passing_score: row.passing_score,
                attempt_number: from_int(row.attempt_number),
                time_taken: from_int(row.time_taken),
                status,
                feedback: row.feedback,
                started_at: row.started_at,
                submitted_at: row.submitted_at,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct GameRow {
    user_id: i64,
    game_type: String,
    level: i32,
    score: i64,
    plays: i32,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<GameRow> for GameProgress {
    type Error = AppError;

    fn try_from(row: GameRow) -> Result<Self, Self::Error> {
        Ok(GameProgress {
            user_id: row.user_id,
            game_type: row.game_type.parse::<GameType>().map_err(AppError::InternalServerError)?,
            level: from_int(row.level),
            score: row.score,
            plays: from_int(row.plays),
            completed_at: row.completed_at,
        })
    }
}

/// Pushes the optional listing filters onto a query already ending in a WHERE clause.
fn push_course_filters(qb: &mut QueryBuilder<'_, Postgres>, params: &CourseListParams) -> Result<(), AppError> {
    if let Some(category) = &params.category {
        qb.push(" AND c.category = ").push_bind(to_text(category)?);
    }
    if let Some(difficulty) = &params.difficulty {
        qb.push(" AND c.difficulty = ").push_bind(to_text(difficulty)?);
    }
    if let Some(search) = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (c.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.tags::text ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn create_user(&self, new: NewUser) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (name, email, password_hash, role, dob, class_standard, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .bind(new.dob)
            .bind(&new.class_standard)
            .bind(new.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict(format!("User '{}' already exists", new.email)),
                other => other,
            })?;
        row.try_into()
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<User, AppError> {
        let sql = format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                email = COALESCE($3, email), \
                password_hash = COALESCE($4, password_hash), \
                dob = COALESCE($5, dob), \
                class_standard = COALESCE($6, class_standard), \
                region = COALESCE($7, region) \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&update.name)
            .bind(&update.email)
            .bind(&update.password_hash)
            .bind(update.dob)
            .bind(&update.class_standard)
            .bind(update.region.map(Json))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict("Email is already in use".to_string()),
                other => other,
            })?
            .ok_or(AppError::NotFound("User not found".to_string()))?;
        row.try_into()
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_students(&self, created_by: Option<i64>) -> Result<Vec<User>, AppError> {
        let sql = format!(
            "SELECT {} FROM users WHERE role = 'student' AND ($1::BIGINT IS NULL OR created_by = $1) ORDER BY id",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(created_by)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, AppError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT name, total_score FROM users WHERE role = 'student' \
             ORDER BY total_score DESC, id ASC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch leaderboard: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(rows
            .into_iter()
            .map(|(name, total_score)| LeaderboardEntry { name, total_score })
            .collect())
    }

    async fn create_course(&self, new: NewCourse) -> Result<Course, AppError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO courses (title, description, created_by, category, difficulty, target_age, \
                estimated_duration, tags, is_published, thumbnail_url, passing_score) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id",
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.created_by)
        .bind(to_text(&new.category)?)
        .bind(to_text(&new.difficulty)?)
        .bind(Json(new.target_age))
        .bind(to_int(new.estimated_duration))
        .bind(Json(&new.tags))
        .bind(new.is_published)
        .bind(&new.thumbnail_url)
        .bind(new.passing_score)
        .fetch_one(&self.pool)
        .await?;

        self.find_course(id)
            .await?
            .ok_or_else(|| AppError::InternalServerError("Inserted course vanished".to_string()))
    }

    async fn find_course(&self, id: i64) -> Result<Option<Course>, AppError> {
        let sql = format!("SELECT {} FROM courses c WHERE c.id = $1", COURSE_COLUMNS);
        sqlx::query_as::<_, CourseRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Course::try_from)
            .transpose()
    }

    async fn list_courses(&self, params: &CourseListParams) -> Result<(Vec<Course>, u64), AppError> {
        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM courses c WHERE c.is_published = TRUE");
        push_course_filters(&mut count_qb, params)?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM courses c WHERE c.is_published = TRUE",
            COURSE_COLUMNS
        ));
        push_course_filters(&mut qb, params)?;
        qb.push(" ORDER BY c.created_at DESC, c.id DESC LIMIT ")
            .push_bind(i64::from(params.limit()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(params.offset()).unwrap_or(i64::MAX));

        let courses = qb
            .build_query_as::<CourseRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Course::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((courses, u64::try_from(total).unwrap_or(0)))
    }

    async fn update_course(&self, id: i64, update: UpdateCourseRequest) -> Result<Course, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {} FROM courses c WHERE c.id = $1 FOR UPDATE", COURSE_COLUMNS);
        let mut course: Course = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("Course not found".to_string()))?
            .try_into()?;

        course.apply(update);

        sqlx::query(
            "UPDATE courses SET title = $2, description = $3, category = $4, difficulty = $5, \
                target_age = $6, estimated_duration = $7, tags = $8, is_published = $9, \
                thumbnail_url = $10, passing_score = $11 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(to_text(&course.category)?)
        .bind(to_text(&course.difficulty)?)
        .bind(Json(course.target_age))
        .bind(to_int(course.estimated_duration))
        .bind(Json(&course.tags))
        .bind(course.is_published)
        .bind(&course.thumbnail_url)
        .bind(course.passing_score)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(course)
    }

    async fn delete_course(&self, id: i64) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        // Modules and enrollments cascade; questions reference their container loosely.
        sqlx::query(
            "DELETE FROM questions WHERE \
                (container_kind = 'course' AND container_id = $1) OR \
                (container_kind = 'module' AND container_id IN (SELECT id FROM modules WHERE course_id = $1))",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_module(&self, new: NewModule) -> Result<Module, AppError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM courses WHERE id = $1")
            .bind(new.course_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound("Course not found".to_string()));
        }

        let sql = format!(
            "INSERT INTO modules (course_id, title, content, sort_order, module_type, duration, \
                learning_objectives, is_published, passing_score) \
             VALUES ($1, $2, $3, \
                COALESCE($4, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM modules WHERE course_id = $1)), \
                $5, $6, $7, $8, $9) \
             RETURNING {}",
            MODULE_COLUMNS
        );
        let row = sqlx::query_as::<_, ModuleRow>(&sql)
            .bind(new.course_id)
            .bind(&new.title)
            .bind(Json(&new.content))
            .bind(new.order)
            .bind(to_text(&new.module_type)?)
            .bind(to_int(new.duration))
            .bind(Json(&new.learning_objectives))
            .bind(new.is_published)
            .bind(new.passing_score)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn find_module(&self, id: i64) -> Result<Option<Module>, AppError> {
        let sql = format!("SELECT {} FROM modules WHERE id = $1", MODULE_COLUMNS);
        sqlx::query_as::<_, ModuleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Module::try_from)
            .transpose()
    }

    async fn list_modules(&self, course_id: i64) -> Result<Vec<Module>, AppError> {
        let sql = format!(
            "SELECT {} FROM modules WHERE course_id = $1 ORDER BY sort_order, id",
            MODULE_COLUMNS
        );
        sqlx::query_as::<_, ModuleRow>(&sql)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Module::try_from)
            .collect()
    }

    async fn add_questions(
        &self,
        container: ContainerRef,
        questions: Vec<NewQuestion>,
    ) -> Result<Vec<Question>, AppError> {
        let (kind, container_id) = container_parts(container);
        let mut tx = self.pool.begin().await?;

        let mut next_order: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sort_order), 0) FROM questions WHERE container_kind = $1 AND container_id = $2",
        )
        .bind(kind)
        .bind(container_id)
        .fetch_one(&mut *tx)
        .await?;

        let sql = format!(
            "INSERT INTO questions (container_kind, container_id, question_text, body, explanation, \
                marks, difficulty, sort_order, image_url, time_limit) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            QUESTION_COLUMNS
        );

        let mut created = Vec::with_capacity(questions.len());
        for new in questions {
            let order = match new.order {
                Some(order) => order,
                None => next_order + 1,
            };
            next_order = next_order.max(order);

            let row = sqlx::query_as::<_, QuestionRow>(&sql)
                .bind(kind)
                .bind(container_id)
                .bind(&new.question_text)
                .bind(Json(&new.kind))
                .bind(&new.explanation)
                .bind(to_int(new.marks))
                .bind(to_text(&new.difficulty)?)
                .bind(order)
                .bind(&new.image_url)
                .bind(to_int(new.time_limit))
                .fetch_one(&mut *tx)
                .await?;
            created.push(Question::try_from(row)?);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn list_questions(&self, container: ContainerRef) -> Result<Vec<Question>, AppError> {
        let (kind, container_id) = container_parts(container);
        let sql = format!(
            "SELECT {} FROM questions WHERE container_kind = $1 AND container_id = $2 ORDER BY sort_order, id",
            QUESTION_COLUMNS
        );
        sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(kind)
            .bind(container_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Question::try_from)
            .collect()
    }

    async fn enroll(
        &self,
        user_id: i64,
        course_id: i64,
        first_module: Option<i64>,
    ) -> Result<CourseProgress, AppError> {
        let sql = format!(
            "INSERT INTO enrollments (user_id, course_id, current_module) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, course_id) DO NOTHING RETURNING {}",
            PROGRESS_COLUMNS
        );
        sqlx::query_as::<_, ProgressRow>(&sql)
            .bind(user_id)
            .bind(course_id)
            .bind(first_module)
            .fetch_optional(&self.pool)
            .await?
            .map(CourseProgress::from)
            .ok_or(AppError::Conflict("Already enrolled in this course".to_string()))
    }

    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> Result<bool, AppError> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM enrollments WHERE user_id = $1 AND course_id = $2")
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn get_progress(&self, user_id: i64, course_id: i64) -> Result<Option<CourseProgress>, AppError> {
        let sql = format!(
            "SELECT {} FROM enrollments WHERE user_id = $1 AND course_id = $2",
            PROGRESS_COLUMNS
        );
        Ok(sqlx::query_as::<_, ProgressRow>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?
            .map(CourseProgress::from))
    }

    async fn list_progress(&self, user_id: i64) -> Result<Vec<CourseProgress>, AppError> {
        let sql = format!(
            "SELECT {} FROM enrollments WHERE user_id = $1 ORDER BY enrolled_at",
            PROGRESS_COLUMNS
        );
        Ok(sqlx::query_as::<_, ProgressRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(CourseProgress::from)
            .collect())
    }

    async fn list_attempts(&self, user_id: i64, container: ContainerRef) -> Result<Vec<Attempt>, AppError> {
        let (kind, container_id) = container_parts(container);
        let sql = format!(
            "SELECT {} FROM attempts WHERE user_id = $1 AND container_kind = $2 AND container_id = $3 \
             ORDER BY attempt_number",
            ATTEMPT_COLUMNS
        );
        sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id)
            .bind(kind)
            .bind(container_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Attempt::try_from)
            .collect()
    }

    async fn begin_attempt(&self, user_id: i64, course_id: i64) -> Result<Box<dyn AttemptTx>, AppError> {
        let mut tx = self.pool.begin().await?;

        // The enrollment row lock serializes submissions for this (learner, course).
        let locked: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM enrollments WHERE user_id = $1 AND course_id = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await?;

        if locked.is_none() {
            return Err(AppError::Unauthorized("You are not enrolled in this course".to_string()));
        }

        Ok(Box::new(PgAttemptTx { tx: Some(tx), user_id, course_id }))
    }

    async fn game_progress(&self, user_id: i64) -> Result<Vec<GameProgress>, AppError> {
        sqlx::query_as::<_, GameRow>(
            "SELECT user_id, game_type, level, score, plays, completed_at FROM game_progress \
             WHERE user_id = $1 ORDER BY game_type",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(GameProgress::try_from)
        .collect()
    }

    async fn apply_game_update(
        &self,
        user_id: i64,
        game_type: GameType,
        update: GameUpdate,
    ) -> Result<(GameProgress, i64), AppError> {
        let mut tx = self.pool.begin().await?;

        // Lock the learner first so concurrent first plays cannot both insert.
        let current_total: Option<i64> =
            sqlx::query_scalar("SELECT total_score FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current_total = current_total.ok_or(AppError::NotFound("User not found".to_string()))?;

        let existing = sqlx::query_as::<_, GameRow>(
            "SELECT user_id, game_type, level, score, plays, completed_at FROM game_progress \
             WHERE user_id = $1 AND game_type = $2",
        )
        .bind(user_id)
        .bind(game_type.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let existed = existing.is_some();
        let mut entry = match existing {
            Some(row) => GameProgress::try_from(row)?,
            None => GameProgress::new(user_id, game_type),
        };
        let credited = update.apply(&mut entry, existed);

        sqlx::query(
            "INSERT INTO game_progress (user_id, game_type, level, score, plays, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, game_type) DO UPDATE SET \
                level = EXCLUDED.level, score = EXCLUDED.score, \
                plays = EXCLUDED.plays, completed_at = EXCLUDED.completed_at",
        )
        .bind(user_id)
        .bind(game_type.as_str())
        .bind(to_int(entry.level))
        .bind(entry.score)
        .bind(to_int(entry.plays))
        .bind(entry.completed_at)
        .execute(&mut *tx)
        .await?;

        let total_score = if credited > 0 {
            sqlx::query_scalar("UPDATE users SET total_score = total_score + $2 WHERE id = $1 RETURNING total_score")
                .bind(user_id)
                .bind(credited)
                .fetch_one(&mut *tx)
                .await?
        } else {
            current_total
        };

        tx.commit().await?;
        Ok((entry, total_score))
    }
}

/// One attempt submission inside a Postgres transaction holding the enrollment row lock.
/// Dropping it uncommitted rolls back.
struct PgAttemptTx {
    tx: Option<Transaction<'static, Postgres>>,
    user_id: i64,
    course_id: i64,
}

impl PgAttemptTx {
    fn conn(&mut self) -> Result<&mut Transaction<'static, Postgres>, AppError> {
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::InternalServerError("Attempt transaction already committed".to_string()))
    }
}

#[async_trait]
impl AttemptTx for PgAttemptTx {
    async fn count_prior_attempts(&mut self, container: ContainerRef) -> Result<u32, AppError> {
        let (kind, container_id) = container_parts(container);
        let user_id = self.user_id;
        let tx = self.conn()?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attempts WHERE user_id = $1 AND container_kind = $2 AND container_id = $3",
        )
        .bind(user_id)
        .bind(kind)
        .bind(container_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn append(&mut self, attempt: NewAttempt) -> Result<Attempt, AppError> {
        let (kind, container_id) = container_parts(attempt.container);
        let tx = self.conn()?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO attempts (user_id, container_kind, container_id, course_id, answers, score, \
                total_marks, percentage, passed, passing_score, attempt_number, time_taken, status, \
                feedback, started_at, submitted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) RETURNING id",
        )
        .bind(attempt.user_id)
        .bind(kind)
        .bind(container_id)
        .bind(attempt.course_id)
        .bind(Json(&attempt.answers))
        .bind(to_int(attempt.score))
        .bind(to_int(attempt.total_marks))
        .bind(attempt.percentage)
        .bind(attempt.passed)
        .bind(attempt.passing_score)
        .bind(to_int(attempt.attempt_number))
        .bind(to_int(attempt.time_taken))
        .bind(attempt.status.as_str())
        .bind(&attempt.feedback)
        .bind(attempt.started_at)
        .bind(attempt.submitted_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!(
                "Attempt {} was already recorded",
                attempt.attempt_number
            )),
            other => other,
        })?;

        Ok(Attempt { id, record: attempt })
    }

    async fn progress(&mut self) -> Result<Option<CourseProgress>, AppError> {
        let (user_id, course_id) = (self.user_id, self.course_id);
        let tx = self.conn()?;
        let sql = format!(
            "SELECT {} FROM enrollments WHERE user_id = $1 AND course_id = $2",
            PROGRESS_COLUMNS
        );
        Ok(sqlx::query_as::<_, ProgressRow>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&mut **tx)
            .await?
            .map(CourseProgress::from))
    }

    async fn save_progress(&mut self, progress: &CourseProgress) -> Result<(), AppError> {
        let tx = self.conn()?;
        sqlx::query(
            "UPDATE enrollments SET completed = $3, current_module = $4, progress_percentage = $5, \
                updated_at = $6 \
             WHERE user_id = $1 AND course_id = $2",
        )
        .bind(progress.user_id)
        .bind(progress.course_id)
        .bind(Json(&progress.completed))
        .bind(progress.current_module)
        .bind(progress.progress_percentage)
        .bind(progress.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn increment_cumulative_score(&mut self, delta: i64) -> Result<(), AppError> {
        let user_id = self.user_id;
        let tx = self.conn()?;
        let result = sqlx::query("UPDATE users SET total_score = total_score + $2 WHERE id = $1")
            .bind(user_id)
            .bind(delta)
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        match self.tx.take() {
            Some(tx) => {
                tx.commit().await?;
                Ok(())
            }
            None => Err(AppError::InternalServerError(
                "Attempt transaction already committed".to_string(),
            )),
        }
    }
}
