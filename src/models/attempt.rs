// src/models/attempt.rs

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{course::ContainerRef, progress::CourseProgress};

/// Learner response, tagged by the question type it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerResponse {
    /// 0-based index into the question's options.
    SingleChoice { selected_option: usize },
    TrueFalse { selected_option: usize },
    FillBlank { user_answer: String },
}

/// One entry of a quiz submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SubmittedAnswer {
    pub question_id: i64,
    /// Seconds.
    #[serde(default)]
    pub time_spent: u32,
    #[validate(custom(function = validate_response))]
    pub response: AnswerResponse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    #[default]
    Completed,
    Submitted,
    AutoSubmitted,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Completed => "completed",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::AutoSubmitted => "auto-submitted",
            AttemptStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(AttemptStatus::Completed),
            "submitted" => Some(AttemptStatus::Submitted),
            "auto-submitted" => Some(AttemptStatus::AutoSubmitted),
            "abandoned" => Some(AttemptStatus::Abandoned),
            _ => None,
        }
    }
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    #[validate(length(max = 200), nested, custom(function = validate_unique_questions))]
    pub answers: Vec<SubmittedAnswer>,
    /// Elapsed seconds for the whole attempt.
    #[serde(default)]
    #[validate(range(max = 86400))]
    pub time_taken: u32,
    #[serde(default)]
    pub status: AttemptStatus,
}

/// Submitted answer after grading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question_id: i64,
    pub response: AnswerResponse,
    pub is_correct: bool,
    pub marks_obtained: u32,
    pub time_spent: u32,
}

/// Attempt as built by the evaluator, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttempt {
    pub user_id: i64,
    pub container: ContainerRef,
    pub course_id: i64,
    pub answers: Vec<GradedAnswer>,
    pub score: u32,
    pub total_marks: u32,
    pub percentage: f64,
    pub passed: bool,
    pub passing_score: f64,
    pub attempt_number: u32,
    pub time_taken: u32,
    pub status: AttemptStatus,
    pub feedback: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// One graded submission. Append-only: never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    #[serde(flatten)]
    pub record: NewAttempt,
}

impl Attempt {
    pub fn result(&self) -> &'static str {
        if self.record.passed { "Pass" } else { "Fail" }
    }
}

/// Response for a quiz submission.
#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub attempt_id: i64,
    pub score: u32,
    pub total_marks: u32,
    pub percentage: f64,
    pub passed: bool,
    pub attempt_number: u32,
    pub result: &'static str,
    pub feedback: String,
    pub answers: Vec<GradedAnswer>,
    /// Newly credited to the cumulative score (0 on repeats and failures).
    pub points_awarded: u32,
    pub progress: Option<CourseProgress>,
}

fn validate_response(response: &AnswerResponse) -> Result<(), validator::ValidationError> {
    match response {
        AnswerResponse::FillBlank { user_answer } if user_answer.len() > 500 => {
            Err(validator::ValidationError::new("answer_too_long"))
        }
        AnswerResponse::SingleChoice { selected_option } | AnswerResponse::TrueFalse { selected_option }
            if *selected_option > 100 =>
        {
            Err(validator::ValidationError::new("option_index_out_of_range"))
        }
        _ => Ok(()),
    }
}

/// A submission may reference each question at most once.
fn validate_unique_questions(answers: &[SubmittedAnswer]) -> Result<(), validator::ValidationError> {
    let mut seen = HashSet::with_capacity(answers.len());
    for answer in answers {
        if !seen.insert(answer.question_id) {
            return Err(validator::ValidationError::new("duplicate_question_id"));
        }
    }
    Ok(())
}
