// src/services/grading.rs

use std::collections::HashMap;

use crate::models::{
    attempt::{AnswerResponse, GradedAnswer, SubmittedAnswer},
    question::{Question, QuestionKind},
};

/// Result of grading one submission against a container's questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorecard {
    pub graded: Vec<GradedAnswer>,
    pub obtained_marks: u32,
    /// Sum of marks of every question that received an answer.
    pub total_marks: u32,
}

/// Case-folded, surrounding whitespace removed.
pub fn normalize_text(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Whether `response` answers `question` correctly.
///
/// Select kinds match on option index only. A response of the wrong kind is
/// never correct.
pub fn is_correct(question: &Question, response: &AnswerResponse) -> bool {
    match (&question.kind, response) {
        (QuestionKind::SingleChoice { .. }, AnswerResponse::SingleChoice { selected_option })
        | (QuestionKind::TrueFalse { .. }, AnswerResponse::TrueFalse { selected_option }) => {
            question.kind.correct_index() == Some(*selected_option)
        }
        (QuestionKind::FillBlank { correct_answer }, AnswerResponse::FillBlank { user_answer }) => {
            normalize_text(correct_answer) == normalize_text(user_answer)
        }
        _ => false,
    }
}

/// Grades every answer whose question belongs to `questions`.
///
/// Answers referencing unknown questions are skipped and count toward neither sum.
/// Graded answers keep submission order.
pub fn score(questions: &[Question], answers: &[SubmittedAnswer]) -> Scorecard {
    let by_id: HashMap<i64, &Question> = questions.iter().map(|q| (q.id, q)).collect();

    let mut graded = Vec::with_capacity(answers.len());
    let mut obtained_marks: u32 = 0;
    let mut total_marks: u32 = 0;

    for answer in answers {
        let Some(question) = by_id.get(&answer.question_id) else {
            continue;
        };

        total_marks = total_marks.saturating_add(question.marks);
        let correct = is_correct(question, &answer.response);
        let marks_obtained = if correct { question.marks } else { 0 };
        obtained_marks = obtained_marks.saturating_add(marks_obtained);

        graded.push(GradedAnswer {
            question_id: answer.question_id,
            response: answer.response.clone(),
            is_correct: correct,
            marks_obtained,
            time_spent: answer.time_spent,
        });
    }

    Scorecard { graded, obtained_marks, total_marks }
}

/// `100 * obtained / total`, or 0 when nothing was gradable.
pub fn percentage(obtained: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * f64::from(obtained) / f64::from(total)
}

pub fn is_passed(percentage: f64, threshold: f64) -> bool {
    percentage >= threshold
}
