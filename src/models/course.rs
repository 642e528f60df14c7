// src/models/course.rs

use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::models::question::QuestionSummary;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Earthquake,
    Flood,
    Fire,
    Cyclone,
    #[default]
    General,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

impl Default for AgeRange {
    fn default() -> Self {
        Self { min: 8, max: 18 }
    }
}

/// A published (or draft) course. Owns modules and, optionally, its own quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    /// Sanitized HTML.
    pub description: String,
    pub created_by: i64,
    pub category: Category,
    pub difficulty: Difficulty,
    pub target_age: AgeRange,
    /// Minutes.
    pub estimated_duration: u32,
    pub tags: Vec<String>,
    pub is_published: bool,
    pub thumbnail_url: Option<String>,
    /// Percentage needed to pass the course-level assessment.
    pub passing_score: f64,
    pub enrolled_count: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    #[default]
    Lesson,
    Video,
    Interactive,
    Quiz,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Document {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(custom(function = validate_url))]
    pub url: String,
    /// pdf, doc, etc.
    #[validate(length(max = 20))]
    pub doc_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ModuleContent {
    /// Sanitized HTML.
    #[validate(length(max = 50000))]
    pub text: Option<String>,
    #[validate(custom(function = validate_url))]
    pub video_url: Option<String>,
    #[serde(default)]
    #[validate(custom(function = validate_urls))]
    pub image_urls: Vec<String>,
    #[serde(default)]
    #[validate(nested)]
    pub documents: Vec<Document>,
}

/// A sub-unit of a course with its own quiz and passing threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub content: ModuleContent,
    pub order: i32,
    pub module_type: ModuleType,
    /// Minutes.
    pub duration: u32,
    pub learning_objectives: Vec<String>,
    pub is_published: bool,
    pub passing_score: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Anything that owns an ordered quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ContainerRef {
    Course(i64),
    Module(i64),
}

impl ContainerRef {
    pub fn kind(&self) -> &'static str {
        match self {
            ContainerRef::Course(_) => "course",
            ContainerRef::Module(_) => "module",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ContainerRef::Course(id) | ContainerRef::Module(id) => *id,
        }
    }

    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "course" => Some(ContainerRef::Course(id)),
            "module" => Some(ContainerRef::Module(id)),
            _ => None,
        }
    }
}

/// Course with its ordered modules and their question summaries.
#[derive(Debug, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub modules: Vec<ModuleDetail>,
    pub quiz: Vec<QuestionSummary>,
}

#[derive(Debug, Serialize)]
pub struct ModuleDetail {
    #[serde(flatten)]
    pub module: Module,
    pub quiz: Vec<QuestionSummary>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = validate_course_age))]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 20000))]
    pub description: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub target_age: AgeRange,
    #[validate(range(min = 1, max = 10000))]
    pub estimated_duration: Option<u32>,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
    #[validate(custom(function = validate_url))]
    pub thumbnail_url: Option<String>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub passing_score: Option<f64>,
}

/// Partial course update; author or admin only.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 20000))]
    pub description: Option<String>,
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub target_age: Option<AgeRange>,
    #[validate(range(min = 1, max = 10000))]
    pub estimated_duration: Option<u32>,
    #[validate(length(max = 20))]
    pub tags: Option<Vec<String>>,
    pub is_published: Option<bool>,
    #[validate(custom(function = validate_url))]
    pub thumbnail_url: Option<String>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub passing_score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateModuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(nested)]
    pub content: ModuleContent,
    /// Defaults to after the last module.
    pub order: Option<i32>,
    #[serde(default)]
    pub module_type: ModuleType,
    #[validate(range(min = 1, max = 1000))]
    pub duration: Option<u32>,
    #[serde(default)]
    #[validate(length(max = 30))]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
    #[validate(range(min = 0.0, max = 100.0))]
    pub passing_score: Option<f64>,
}

/// Insert form handed to the store; text already sanitized.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub created_by: i64,
    pub category: Category,
    pub difficulty: Difficulty,
    pub target_age: AgeRange,
    pub estimated_duration: u32,
    pub tags: Vec<String>,
    pub is_published: bool,
    pub thumbnail_url: Option<String>,
    pub passing_score: f64,
}

#[derive(Debug, Clone)]
pub struct NewModule {
    pub course_id: i64,
    pub title: String,
    pub content: ModuleContent,
    pub order: Option<i32>,
    pub module_type: ModuleType,
    pub duration: u32,
    pub learning_objectives: Vec<String>,
    pub is_published: bool,
    pub passing_score: f64,
}

impl Course {
    /// Applies a validated partial update in place.
    pub fn apply(&mut self, update: UpdateCourseRequest) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        if let Some(difficulty) = update.difficulty {
            self.difficulty = difficulty;
        }
        if let Some(target_age) = update.target_age {
            self.target_age = target_age;
        }
        if let Some(duration) = update.estimated_duration {
            self.estimated_duration = duration;
        }
        if let Some(tags) = update.tags {
            self.tags = tags;
        }
        if let Some(is_published) = update.is_published {
            self.is_published = is_published;
        }
        if let Some(url) = update.thumbnail_url {
            self.thumbnail_url = Some(url);
        }
        if let Some(score) = update.passing_score {
            self.passing_score = score;
        }
    }

    /// Case-insensitive match over title, description and tags.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

/// Course listing filters (`GET /api/courses`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseListParams {
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl CourseListParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }

    /// Widened so a huge `page` yields an empty page instead of overflowing.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }
}

#[derive(Debug, Serialize)]
pub struct CoursePage {
    pub count: usize,
    pub total: u64,
    pub page: u32,
    pub pages: u64,
    pub data: Vec<Course>,
}

pub(crate) fn validate_url(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

fn validate_urls(urls: &[String]) -> Result<(), validator::ValidationError> {
    if urls.len() > 20 {
        return Err(validator::ValidationError::new("too_many_urls"));
    }
    for url in urls {
        validate_url(url)?;
    }
    Ok(())
}

fn validate_course_age(req: &CreateCourseRequest) -> Result<(), validator::ValidationError> {
    if req.target_age.min > req.target_age.max {
        return Err(validator::ValidationError::new("age_min_exceeds_max"));
    }
    Ok(())
}
