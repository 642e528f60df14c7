// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::course::{ContainerRef, validate_url};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct QuestionOption {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// Question body, tagged by question type.
///
/// Select-based kinds are graded by option index: the submitted index must be
/// the index of the single option flagged correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice { options: Vec<QuestionOption> },
    TrueFalse { options: Vec<QuestionOption> },
    FillBlank { correct_answer: String },
}

impl QuestionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice { .. } => "single_choice",
            QuestionKind::TrueFalse { .. } => "true_false",
            QuestionKind::FillBlank { .. } => "fill_blank",
        }
    }

    pub fn options(&self) -> &[QuestionOption] {
        match self {
            QuestionKind::SingleChoice { options } | QuestionKind::TrueFalse { options } => options,
            QuestionKind::FillBlank { .. } => &[],
        }
    }

    /// Index of the option flagged correct, for select-based kinds.
    pub fn correct_index(&self) -> Option<usize> {
        self.options().iter().position(|o| o.is_correct)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionDifficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// An authored quiz question, owned by exactly one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub container: ContainerRef,
    pub question_text: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    pub explanation: Option<String>,
    pub marks: u32,
    pub difficulty: QuestionDifficulty,
    pub order: i32,
    pub image_url: Option<String>,
    /// Seconds.
    pub time_limit: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Option as shown to learners (no correct flag).
#[derive(Debug, Clone, Serialize)]
pub struct PublicOption {
    pub index: usize,
    pub text: String,
}

/// DTO for sending question to client (excludes answers and explanation).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: &'static str,
    pub question_text: String,
    pub options: Vec<PublicOption>,
    pub marks: u32,
    pub order: i32,
    pub image_url: Option<String>,
    pub time_limit: u32,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_type: q.kind.type_name(),
            question_text: q.question_text.clone(),
            options: q
                .kind
                .options()
                .iter()
                .enumerate()
                .map(|(index, o)| PublicOption { index, text: o.text.clone() })
                .collect(),
            marks: q.marks,
            order: q.order,
            image_url: q.image_url.clone(),
            time_limit: q.time_limit,
        }
    }
}

/// Short form used inside course listings.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionSummary {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: &'static str,
    pub question_text: String,
    pub marks: u32,
    pub difficulty: QuestionDifficulty,
}

impl From<&Question> for QuestionSummary {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_type: q.kind.type_name(),
            question_text: q.question_text.clone(),
            marks: q.marks,
            difficulty: q.difficulty,
        }
    }
}

/// DTO for authoring a question.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub question_text: String,
    #[serde(flatten)]
    #[validate(custom(function = validate_kind))]
    pub kind: QuestionKind,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
    #[validate(range(max = 1000))]
    pub marks: Option<u32>,
    #[serde(default)]
    pub difficulty: QuestionDifficulty,
    /// Defaults to after the last question of the container.
    pub order: Option<i32>,
    #[validate(custom(function = validate_url))]
    pub image_url: Option<String>,
    #[validate(range(min = 5, max = 3600))]
    pub time_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddQuestionsRequest {
    #[validate(length(min = 1, max = 100), nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

/// Insert form handed to the store.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub question_text: String,
    pub kind: QuestionKind,
    pub explanation: Option<String>,
    pub marks: u32,
    pub difficulty: QuestionDifficulty,
    pub order: Option<i32>,
    pub image_url: Option<String>,
    pub time_limit: u32,
}

impl From<CreateQuestionRequest> for NewQuestion {
    fn from(req: CreateQuestionRequest) -> Self {
        Self {
            question_text: req.question_text,
            kind: req.kind,
            explanation: req.explanation,
            marks: req.marks.unwrap_or(1),
            difficulty: req.difficulty,
            order: req.order,
            image_url: req.image_url,
            time_limit: req.time_limit.unwrap_or(60),
        }
    }
}

/// Select kinds need a non-empty option set with exactly one correct option.
fn validate_kind(kind: &QuestionKind) -> Result<(), validator::ValidationError> {
    match kind {
        QuestionKind::SingleChoice { options } | QuestionKind::TrueFalse { options } => {
            if options.is_empty() {
                return Err(validator::ValidationError::new("options_cannot_be_empty"));
            }
            if options.len() > 10 {
                return Err(validator::ValidationError::new("too_many_options"));
            }
            for opt in options {
                if opt.text.trim().is_empty() || opt.text.len() > 500 {
                    return Err(validator::ValidationError::new("invalid_option_text"));
                }
            }
            if options.iter().filter(|o| o.is_correct).count() != 1 {
                return Err(validator::ValidationError::new("exactly_one_correct_option"));
            }
            if matches!(kind, QuestionKind::TrueFalse { .. }) && options.len() != 2 {
                return Err(validator::ValidationError::new("true_false_needs_two_options"));
            }
        }
        QuestionKind::FillBlank { correct_answer } => {
            if correct_answer.trim().is_empty() || correct_answer.len() > 500 {
                return Err(validator::ValidationError::new("invalid_correct_answer"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: serde_json::Value) -> CreateQuestionRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_single_choice_needs_exactly_one_correct() {
        let req = parse(serde_json::json!({
            "question_text": "What do you do first in an earthquake?",
            "type": "single_choice",
            "options": [
                {"text": "Drop, cover, hold on", "is_correct": true},
                {"text": "Run outside", "is_correct": true}
            ],
            "marks": 10
        }));
        assert!(req.validate().is_err());

        let req = parse(serde_json::json!({
            "question_text": "What do you do first in an earthquake?",
            "type": "single_choice",
            "options": [
                {"text": "Drop, cover, hold on", "is_correct": true},
                {"text": "Run outside"}
            ]
        }));
        assert!(req.validate().is_ok());
        assert_eq!(req.kind.correct_index(), Some(0));
    }

    #[test]
    fn test_empty_options_rejected() {
        let req = parse(serde_json::json!({
            "question_text": "Empty",
            "type": "true_false",
            "options": []
        }));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_fill_blank_defaults() {
        let req = parse(serde_json::json!({
            "question_text": "The capital of France is ____",
            "type": "fill_blank",
            "correct_answer": "Paris"
        }));
        assert!(req.validate().is_ok());
        let new: NewQuestion = req.into();
        assert_eq!(new.marks, 1);
        assert_eq!(new.time_limit, 60);
    }

    #[test]
    fn test_public_question_hides_correct_flags() {
        let q = Question {
            id: 4,
            container: ContainerRef::Module(2),
            question_text: "Is water essential?".to_string(),
            kind: QuestionKind::TrueFalse {
                options: vec![
                    QuestionOption { text: "True".to_string(), is_correct: true },
                    QuestionOption { text: "False".to_string(), is_correct: false },
                ],
            },
            explanation: Some("secret".to_string()),
            marks: 2,
            difficulty: QuestionDifficulty::Easy,
            order: 1,
            image_url: None,
            time_limit: 60,
            created_at: chrono::Utc::now(),
        };
        let value = serde_json::to_value(PublicQuestion::from(&q)).unwrap();
        assert_eq!(value["type"], "true_false");
        assert!(value.get("explanation").is_none());
        assert!(value["options"][0].get("is_correct").is_none());
        assert_eq!(value["options"][1]["index"], 1);
    }

    #[test]
    fn test_image_url_must_parse() {
        let mut req = parse(serde_json::json!({
            "question_text": "Which way is the exit?",
            "type": "fill_blank",
            "correct_answer": "left",
            "image_url": "not a url"
        }));
        assert!(req.validate().is_err());

        req.image_url = Some("https://example.com/exit.png".to_string());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_serializes_with_flat_kind() {
        let req = parse(serde_json::json!({
            "question_text": "Water boils at 100 C at sea level.",
            "type": "true_false",
            "options": [{ "text": "True", "is_correct": true }, { "text": "False" }]
        }));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "true_false");
        assert_eq!(value["options"][0]["is_correct"], true);
        assert!(value.get("kind").is_none());
    }
}
