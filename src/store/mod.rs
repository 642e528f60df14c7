// src/store/mod.rs

//! Storage boundary.
//!
//! Handlers and services only ever see `Arc<dyn Store>`; which backend sits behind
//! it is decided once in `main`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, NewAttempt},
        course::{ContainerRef, Course, CourseListParams, Module, NewCourse, NewModule, UpdateCourseRequest},
        progress::{CourseProgress, GameProgress, GameType, GameUpdate},
        question::{NewQuestion, Question},
        user::{LeaderboardEntry, NewUser, User, UserUpdate},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs and the status banner.
    fn backend(&self) -> &'static str;

    // Users

    /// Fails with `Conflict` if the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    /// Fails with `NotFound` for unknown ids and `Conflict` for a taken email.
    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<User, AppError>;
    async fn delete_user(&self, id: i64) -> Result<bool, AppError>;
    /// Students, optionally only those created by `created_by`.
    async fn list_students(&self, created_by: Option<i64>) -> Result<Vec<User>, AppError>;
    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, AppError>;

    // Courses and modules

    async fn create_course(&self, course: NewCourse) -> Result<Course, AppError>;
    async fn find_course(&self, id: i64) -> Result<Option<Course>, AppError>;
    /// Published courses matching the filters, newest first, plus the total match count.
    async fn list_courses(&self, params: &CourseListParams) -> Result<(Vec<Course>, u64), AppError>;
    async fn update_course(&self, id: i64, update: UpdateCourseRequest) -> Result<Course, AppError>;
    /// Removes the course with its modules, questions and enrollments.
    async fn delete_course(&self, id: i64) -> Result<bool, AppError>;
    async fn create_module(&self, module: NewModule) -> Result<Module, AppError>;
    async fn find_module(&self, id: i64) -> Result<Option<Module>, AppError>;
    /// Ordered by `order`, then id.
    async fn list_modules(&self, course_id: i64) -> Result<Vec<Module>, AppError>;

    // Questions

    async fn add_questions(
        &self,
        container: ContainerRef,
        questions: Vec<NewQuestion>,
    ) -> Result<Vec<Question>, AppError>;
    /// Ordered by `order`, then id.
    async fn list_questions(&self, container: ContainerRef) -> Result<Vec<Question>, AppError>;

    // Enrollment and progress

    /// Creates the empty progress record. Fails with `Conflict` when already enrolled.
    async fn enroll(
        &self,
        user_id: i64,
        course_id: i64,
        first_module: Option<i64>,
    ) -> Result<CourseProgress, AppError>;
    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> Result<bool, AppError>;
    async fn get_progress(&self, user_id: i64, course_id: i64) -> Result<Option<CourseProgress>, AppError>;
    async fn list_progress(&self, user_id: i64) -> Result<Vec<CourseProgress>, AppError>;

    // Attempts

    /// Attempt history, ordered by attempt number.
    async fn list_attempts(&self, user_id: i64, container: ContainerRef) -> Result<Vec<Attempt>, AppError>;

    /// Opens the single-writer section for (learner, course).
    ///
    /// Until the returned unit of work is committed or dropped, no other
    /// `begin_attempt` for the same pair proceeds. Dropping without `commit`
    /// discards every staged write.
    async fn begin_attempt(&self, user_id: i64, course_id: i64) -> Result<Box<dyn AttemptTx>, AppError>;

    // Games

    async fn game_progress(&self, user_id: i64) -> Result<Vec<GameProgress>, AppError>;
    /// Applies `update` to the learner's entry for `game_type` (creating it if absent)
    /// and credits the cumulative score in the same write.
    /// Returns the entry and the learner's new cumulative score.
    async fn apply_game_update(
        &self,
        user_id: i64,
        game_type: GameType,
        update: GameUpdate,
    ) -> Result<(GameProgress, i64), AppError>;
}

/// Writes of one attempt submission, committed together.
#[async_trait]
pub trait AttemptTx: Send {
    async fn count_prior_attempts(&mut self, container: ContainerRef) -> Result<u32, AppError>;
    /// Fails with `Conflict` if the attempt number is already taken.
    async fn append(&mut self, attempt: NewAttempt) -> Result<Attempt, AppError>;
    async fn progress(&mut self) -> Result<Option<CourseProgress>, AppError>;
    async fn save_progress(&mut self, progress: &CourseProgress) -> Result<(), AppError>;
    async fn increment_cumulative_score(&mut self, delta: i64) -> Result<(), AppError>;
    async fn commit(&mut self) -> Result<(), AppError>;
}
