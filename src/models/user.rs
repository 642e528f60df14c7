// src/models/user.rs

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::progress::{CourseProgress, GameProgress};

/// Platform role. Students are created by teachers; teachers and admins author content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    /// Teachers and admins may author courses and manage student accounts.
    pub fn can_author(&self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Region {
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(max = 100))]
    pub district: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: Option<f64>,
}

/// A platform account, learner or author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    pub name: String,

    /// Unique, stored lowercase.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub role: Role,

    /// Students only.
    pub dob: Option<chrono::NaiveDate>,

    /// Students only, e.g. "Class 8" or "Grade 10".
    pub class_standard: Option<String>,

    /// Teacher or admin that created this student account.
    pub created_by: Option<i64>,

    pub region: Option<Region>,

    /// Cumulative score across courses and games. Never decreases.
    pub total_score: i64,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Input for inserting a user; the store assigns id, score and timestamp.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub dob: Option<chrono::NaiveDate>,
    pub class_standard: Option<String>,
    pub created_by: Option<i64>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub dob: Option<chrono::NaiveDate>,
    pub class_standard: Option<String>,
    pub region: Option<Region>,
}

/// Current user with embedded learning state.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub course_progress: Vec<CourseProgress>,
    pub game_progress: Vec<GameProgress>,
}

/// Self-registration (teachers and admins only).
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(
        min = 2,
        max = 80,
        message = "Name length must be between 2 and 80 characters."
    ))]
    pub name: String,
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    pub role: Option<Role>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 80))]
    pub name: Option<String>,
    #[validate(nested)]
    pub region: Option<Region>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 128))]
    pub current_password: String,
    #[validate(length(min = 6, max = 128))]
    pub new_password: String,
}

/// Teacher/admin creating a student account. All fields are required.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(length(min = 2, max = 80))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
    pub dob: chrono::NaiveDate,
    #[validate(custom(function = validate_class_standard))]
    pub class_standard: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStudentRequest {
    #[validate(length(min = 2, max = 80))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub dob: Option<chrono::NaiveDate>,
    #[validate(custom(function = validate_class_standard))]
    pub class_standard: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 6, max = 128))]
    pub new_password: String,
}

/// Login/registration response body.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
}

/// Row of the cumulative-score leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub total_score: i64,
}

static CLASS_STANDARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Class|Grade|Std)\s?(0?[1-9]|1[0-2])$").expect("class standard pattern")
});

/// Accepts "Class 8", "Grade 10", "Std 4".
fn validate_class_standard(value: &str) -> Result<(), validator::ValidationError> {
    if !CLASS_STANDARD.is_match(value.trim()) {
        return Err(validator::ValidationError::new("invalid_class_standard"));
    }
    Ok(())
}

/// Emails are compared and stored lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
