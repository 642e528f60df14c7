// src/store/memory.rs

//! In-process store used when no `DATABASE_URL` is configured, and by the tests.
//!
//! All state lives behind one mutex, so every operation (and every attempt
//! unit of work, which holds the guard until it commits) is serialized.
//! With a snapshot path the whole state is rewritten as JSON after each
//! committed mutation and reloaded on startup.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, NewAttempt},
        course::{ContainerRef, Course, CourseListParams, Module, NewCourse, NewModule, UpdateCourseRequest},
        progress::{CourseProgress, GameProgress, GameType, GameUpdate},
        question::{NewQuestion, Question},
        user::{LeaderboardEntry, NewUser, Role, User, UserUpdate},
    },
    store::{AttemptTx, Store},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<i64, User>,
    /// Password hashes, kept apart because `User` never serializes its hash.
    credentials: BTreeMap<i64, String>,
    courses: BTreeMap<i64, Course>,
    modules: BTreeMap<i64, Module>,
    questions: BTreeMap<i64, Question>,
    enrollments: Vec<CourseProgress>,
    attempts: Vec<Attempt>,
    games: Vec<GameProgress>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn with_enrolled_count(&self, course: &Course) -> Course {
        let mut course = course.clone();
        course.enrolled_count = self
            .enrollments
            .iter()
            .filter(|p| p.course_id == course.id)
            .count() as u32;
        course
    }

    fn progress_index(&self, user_id: i64, course_id: i64) -> Option<usize> {
        self.enrollments
            .iter()
            .position(|p| p.user_id == user_id && p.course_id == course_id)
    }

    fn sorted_questions(&self, container: ContainerRef) -> Vec<Question> {
        let mut questions: Vec<Question> = self
            .questions
            .values()
            .filter(|q| q.container == container)
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.order, q.id));
        questions
    }

    fn restore_credentials(&mut self) {
        for (id, hash) in &self.credentials {
            if let Some(user) = self.users.get_mut(id) {
                user.password_hash = hash.clone();
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a snapshot-backed store, loading the file if it exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let mut state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<MemoryState>(&bytes).map_err(|e| {
                AppError::InternalServerError(format!("Corrupt data file {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryState::default(),
            Err(e) => return Err(e.into()),
        };
        state.restore_credentials();
        tracing::info!("Opened data file {:?} ({} users)", path, state.users.len());

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            snapshot: Some(path),
        })
    }

    /// Mutators work on a copy of the state; the copy goes live only once the
    /// snapshot holding it is on disk.
    async fn publish(&self, live: &mut MemoryState, next: MemoryState) -> Result<(), AppError> {
        write_snapshot(self.snapshot.as_deref(), &next).await?;
        *live = next;
        Ok(())
    }
}

async fn write_snapshot(path: Option<&Path>, state: &MemoryState) -> Result<(), AppError> {
    let Some(path) = path else {
        return Ok(());
    };
    let bytes = serde_json::to_vec_pretty(state)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        if self.snapshot.is_some() { "file" } else { "memory" }
    }

    async fn create_user(&self, new: NewUser) -> Result<User, AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        if state.email_taken(&new.email, None) {
            return Err(AppError::Conflict(format!("User '{}' already exists", new.email)));
        }

        let id = state.next_id();
        let user = User {
            id,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            dob: new.dob,
            class_standard: new.class_standard,
            created_by: new.created_by,
            region: None,
            total_score: 0,
            created_at: chrono::Utc::now(),
        };
        state.credentials.insert(id, user.password_hash.clone());
        state.users.insert(id, user.clone());
        self.publish(&mut guard, state).await?;
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<User, AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        if let Some(email) = &update.email {
            if state.email_taken(email, Some(id)) {
                return Err(AppError::Conflict(format!("User '{}' already exists", email)));
            }
        }

        let user = state
            .users
            .get_mut(&id)
            .ok_or(AppError::NotFound("User not found".to_string()))?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(dob) = update.dob {
            user.dob = Some(dob);
        }
        if let Some(class_standard) = update.class_standard {
            user.class_standard = Some(class_standard);
        }
        if let Some(region) = update.region {
            user.region = Some(region);
        }
        if let Some(hash) = update.password_hash {
            user.password_hash = hash;
        }
        let user = user.clone();
        state.credentials.insert(id, user.password_hash.clone());
        self.publish(&mut guard, state).await?;
        Ok(user)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        state.credentials.remove(&id);
        state.enrollments.retain(|p| p.user_id != id);
        state.attempts.retain(|a| a.record.user_id != id);
        state.games.retain(|g| g.user_id != id);
        for user in state.users.values_mut() {
            if user.created_by == Some(id) {
                user.created_by = None;
            }
        }
        self.publish(&mut guard, state).await?;
        Ok(true)
    }

    async fn list_students(&self, created_by: Option<i64>) -> Result<Vec<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.role == Role::Student)
            .filter(|u| created_by.is_none() || u.created_by == created_by)
            .cloned()
            .collect())
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, AppError> {
        let state = self.state.lock().await;
        let mut learners: Vec<&User> = state
            .users
            .values()
            .filter(|u| u.role == Role::Student)
            .collect();
        learners.sort_by(|a, b| b.total_score.cmp(&a.total_score).then(a.id.cmp(&b.id)));
        Ok(learners
            .into_iter()
            .take(limit as usize)
            .map(|u| LeaderboardEntry { name: u.name.clone(), total_score: u.total_score })
            .collect())
    }

    async fn create_course(&self, new: NewCourse) -> Result<Course, AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        let id = state.next_id();
        let course = Course {
            id,
            title: new.title,
            description: new.description,
            created_by: new.created_by,
            category: new.category,
            difficulty: new.difficulty,
            target_age: new.target_age,
            estimated_duration: new.estimated_duration,
            tags: new.tags,
            is_published: new.is_published,
            thumbnail_url: new.thumbnail_url,
            passing_score: new.passing_score,
            enrolled_count: 0,
            created_at: chrono::Utc::now(),
        };
        state.courses.insert(id, course.clone());
        self.publish(&mut guard, state).await?;
        Ok(course)
    }

    async fn find_course(&self, id: i64) -> Result<Option<Course>, AppError> {
        let state = self.state.lock().await;
        Ok(state.courses.get(&id).map(|c| state.with_enrolled_count(c)))
    }

    async fn list_courses(&self, params: &CourseListParams) -> Result<(Vec<Course>, u64), AppError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Course> = state
            .courses
            .values()
            .filter(|c| c.is_published)
            .filter(|c| params.category.is_none_or(|cat| c.category == cat))
            .filter(|c| params.difficulty.is_none_or(|d| c.difficulty == d))
            .filter(|c| params.search.as_deref().is_none_or(|s| c.matches_search(s)))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(params.offset()).unwrap_or(usize::MAX))
            .take(params.limit() as usize)
            .map(|c| state.with_enrolled_count(c))
            .collect();
        Ok((page, total))
    }

    async fn update_course(&self, id: i64, update: UpdateCourseRequest) -> Result<Course, AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        let course = state
            .courses
            .get_mut(&id)
            .ok_or(AppError::NotFound("Course not found".to_string()))?;
        course.apply(update);
        let course = course.clone();
        self.publish(&mut guard, state).await?;
        Ok(guard.with_enrolled_count(&course))
    }

    async fn delete_course(&self, id: i64) -> Result<bool, AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        if state.courses.remove(&id).is_none() {
            return Ok(false);
        }
        let module_ids: Vec<i64> = state
            .modules
            .values()
            .filter(|m| m.course_id == id)
            .map(|m| m.id)
            .collect();
        state.modules.retain(|_, m| m.course_id != id);
        state.questions.retain(|_, q| match q.container {
            ContainerRef::Course(course_id) => course_id != id,
            ContainerRef::Module(module_id) => !module_ids.contains(&module_id),
        });
        state.enrollments.retain(|p| p.course_id != id);
        self.publish(&mut guard, state).await?;
        Ok(true)
    }

    async fn create_module(&self, new: NewModule) -> Result<Module, AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        if !state.courses.contains_key(&new.course_id) {
            return Err(AppError::NotFound("Course not found".to_string()));
        }
        let order = new.order.unwrap_or_else(|| {
            state
                .modules
                .values()
                .filter(|m| m.course_id == new.course_id)
                .map(|m| m.order)
                .max()
                .map_or(1, |max| max + 1)
        });

        let id = state.next_id();
        let module = Module {
            id,
            course_id: new.course_id,
            title: new.title,
            content: new.content,
            order,
            module_type: new.module_type,
            duration: new.duration,
            learning_objectives: new.learning_objectives,
            is_published: new.is_published,
            passing_score: new.passing_score,
            created_at: chrono::Utc::now(),
        };
        state.modules.insert(id, module.clone());
        self.publish(&mut guard, state).await?;
        Ok(module)
    }

    async fn find_module(&self, id: i64) -> Result<Option<Module>, AppError> {
        Ok(self.state.lock().await.modules.get(&id).cloned())
    }

    async fn list_modules(&self, course_id: i64) -> Result<Vec<Module>, AppError> {
        let state = self.state.lock().await;
        let mut modules: Vec<Module> = state
            .modules
            .values()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| (m.order, m.id));
        Ok(modules)
    }

    async fn add_questions(
        &self,
        container: ContainerRef,
        questions: Vec<NewQuestion>,
    ) -> Result<Vec<Question>, AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        let mut next_order = state
            .questions
            .values()
            .filter(|q| q.container == container)
            .map(|q| q.order)
            .max()
            .unwrap_or(0);

        let mut created = Vec::with_capacity(questions.len());
        for new in questions {
            let order = match new.order {
                Some(order) => order,
                None => {
                    next_order += 1;
                    next_order
                }
            };
            next_order = next_order.max(order);

            let id = state.next_id();
            let question = Question {
                id,
                container,
                question_text: new.question_text,
                kind: new.kind,
                explanation: new.explanation,
                marks: new.marks,
                difficulty: new.difficulty,
                order,
                image_url: new.image_url,
                time_limit: new.time_limit,
                created_at: chrono::Utc::now(),
            };
            state.questions.insert(id, question.clone());
            created.push(question);
        }
        self.publish(&mut guard, state).await?;
        Ok(created)
    }

    async fn list_questions(&self, container: ContainerRef) -> Result<Vec<Question>, AppError> {
        Ok(self.state.lock().await.sorted_questions(container))
    }

    async fn enroll(
        &self,
        user_id: i64,
        course_id: i64,
        first_module: Option<i64>,
    ) -> Result<CourseProgress, AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        if state.progress_index(user_id, course_id).is_some() {
            return Err(AppError::Conflict("Already enrolled in this course".to_string()));
        }
        let progress = CourseProgress::new(user_id, course_id, first_module);
        state.enrollments.push(progress.clone());
        self.publish(&mut guard, state).await?;
        Ok(progress)
    }

    async fn is_enrolled(&self, user_id: i64, course_id: i64) -> Result<bool, AppError> {
        Ok(self.state.lock().await.progress_index(user_id, course_id).is_some())
    }

    async fn get_progress(&self, user_id: i64, course_id: i64) -> Result<Option<CourseProgress>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .progress_index(user_id, course_id)
            .map(|i| state.enrollments[i].clone()))
    }

    async fn list_progress(&self, user_id: i64) -> Result<Vec<CourseProgress>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .enrollments
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_attempts(&self, user_id: i64, container: ContainerRef) -> Result<Vec<Attempt>, AppError> {
        let state = self.state.lock().await;
        let mut attempts: Vec<Attempt> = state
            .attempts
            .iter()
            .filter(|a| a.record.user_id == user_id && a.record.container == container)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.record.attempt_number);
        Ok(attempts)
    }

    async fn begin_attempt(&self, user_id: i64, course_id: i64) -> Result<Box<dyn AttemptTx>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        if guard.progress_index(user_id, course_id).is_none() {
            return Err(AppError::Unauthorized("You are not enrolled in this course".to_string()));
        }
        Ok(Box::new(MemoryAttemptTx {
            guard,
            snapshot: self.snapshot.clone(),
            user_id,
            course_id,
            staged_attempts: Vec::new(),
            staged_progress: None,
            staged_score: 0,
        }))
    }

    async fn game_progress(&self, user_id: i64) -> Result<Vec<GameProgress>, AppError> {
        let state = self.state.lock().await;
        let mut entries: Vec<GameProgress> = state
            .games
            .iter()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|g| g.game_type);
        Ok(entries)
    }

    async fn apply_game_update(
        &self,
        user_id: i64,
        game_type: GameType,
        update: GameUpdate,
    ) -> Result<(GameProgress, i64), AppError> {
        let mut guard = self.state.lock().await;
        let mut state = guard.clone();
        if !state.users.contains_key(&user_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let index = state
            .games
            .iter()
            .position(|g| g.user_id == user_id && g.game_type == game_type);
        let existed = index.is_some();
        let index = match index {
            Some(i) => i,
            None => {
                state.games.push(GameProgress::new(user_id, game_type));
                state.games.len() - 1
            }
        };

        let credited = update.apply(&mut state.games[index], existed);
        let entry = state.games[index].clone();

        let total_score = match state.users.get_mut(&user_id) {
            Some(user) => {
                user.total_score += credited;
                user.total_score
            }
            None => 0,
        };
        self.publish(&mut guard, state).await?;
        Ok((entry, total_score))
    }
}

/// Holds the store guard for the whole submission; writes are staged until commit.
struct MemoryAttemptTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<PathBuf>,
    user_id: i64,
    course_id: i64,
    staged_attempts: Vec<Attempt>,
    staged_progress: Option<CourseProgress>,
    staged_score: i64,
}

#[async_trait]
impl AttemptTx for MemoryAttemptTx {
    async fn count_prior_attempts(&mut self, container: ContainerRef) -> Result<u32, AppError> {
        let committed = self
            .guard
            .attempts
            .iter()
            .filter(|a| a.record.user_id == self.user_id && a.record.container == container)
            .count();
        let staged = self
            .staged_attempts
            .iter()
            .filter(|a| a.record.container == container)
            .count();
        Ok((committed + staged) as u32)
    }

    async fn append(&mut self, attempt: NewAttempt) -> Result<Attempt, AppError> {
        let taken = self
            .guard
            .attempts
            .iter()
            .chain(self.staged_attempts.iter())
            .any(|a| {
                a.record.user_id == attempt.user_id
                    && a.record.container == attempt.container
                    && a.record.attempt_number == attempt.attempt_number
            });
        if taken {
            return Err(AppError::Conflict(format!(
                "Attempt {} was already recorded",
                attempt.attempt_number
            )));
        }

        let id = self.guard.next_id + 1 + self.staged_attempts.len() as i64;
        let attempt = Attempt { id, record: attempt };
        self.staged_attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn progress(&mut self) -> Result<Option<CourseProgress>, AppError> {
        if let Some(progress) = &self.staged_progress {
            return Ok(Some(progress.clone()));
        }
        Ok(self
            .guard
            .progress_index(self.user_id, self.course_id)
            .map(|i| self.guard.enrollments[i].clone()))
    }

    async fn save_progress(&mut self, progress: &CourseProgress) -> Result<(), AppError> {
        self.staged_progress = Some(progress.clone());
        Ok(())
    }

    async fn increment_cumulative_score(&mut self, delta: i64) -> Result<(), AppError> {
        self.staged_score += delta;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        if self.staged_score != 0 && !self.guard.users.contains_key(&self.user_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let mut next = self.guard.clone();

        let attempts = std::mem::take(&mut self.staged_attempts);
        next.next_id += attempts.len() as i64;
        next.attempts.extend(attempts);

        if let Some(progress) = self.staged_progress.take() {
            match next.progress_index(self.user_id, self.course_id) {
                Some(i) => next.enrollments[i] = progress,
                None => next.enrollments.push(progress),
            }
        }

        if let Some(user) = next.users.get_mut(&self.user_id) {
            user.total_score += std::mem::take(&mut self.staged_score);
        }

        // Nothing goes live unless the snapshot write succeeds.
        write_snapshot(self.snapshot.as_deref(), &next).await?;
        *self.guard = next;
        Ok(())
    }
}
