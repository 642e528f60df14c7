// src/services/evaluator.rs

//! Attempt evaluation: grade a submission, record it, and advance course progress.

use std::sync::Arc;

use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptResponse, NewAttempt, SubmitAttemptRequest},
        course::ContainerRef,
        progress::{CourseProgress, SubUnit},
    },
    services::grading,
    store::Store,
};

/// Outcome of one evaluated submission.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub attempt: Attempt,
    /// Marks credited to the cumulative score by this attempt.
    pub points_awarded: u32,
    /// Progress after the attempt was recorded.
    pub progress: Option<CourseProgress>,
}

impl From<Evaluation> for AttemptResponse {
    fn from(eval: Evaluation) -> Self {
        let result = eval.attempt.result();
        let record = eval.attempt.record;
        Self {
            attempt_id: eval.attempt.id,
            score: record.score,
            total_marks: record.total_marks,
            percentage: record.percentage,
            passed: record.passed,
            attempt_number: record.attempt_number,
            result,
            feedback: record.feedback,
            answers: record.answers,
            points_awarded: eval.points_awarded,
            progress: eval.progress,
        }
    }
}

/// The container's owning course and its passing threshold.
struct Resolved {
    course_id: i64,
    passing_score: f64,
}

#[derive(Clone)]
pub struct AttemptEvaluator {
    store: Arc<dyn Store>,
}

impl AttemptEvaluator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn resolve(&self, container: ContainerRef) -> Result<Resolved, AppError> {
        match container {
            ContainerRef::Course(id) => {
                let course = self
                    .store
                    .find_course(id)
                    .await?
                    .ok_or(AppError::NotFound("Course not found".to_string()))?;
                Ok(Resolved { course_id: course.id, passing_score: course.passing_score })
            }
            ContainerRef::Module(id) => {
                let module = self
                    .store
                    .find_module(id)
                    .await?
                    .ok_or(AppError::NotFound("Module not found".to_string()))?;
                Ok(Resolved { course_id: module.course_id, passing_score: module.passing_score })
            }
        }
    }

    /// Grades `submission` against `container` and records the attempt.
    ///
    /// Attempt numbering, the attempt itself, the progress update and the
    /// cumulative score increment are committed together or not at all.
    pub async fn evaluate(
        &self,
        container: ContainerRef,
        learner_id: i64,
        submission: SubmitAttemptRequest,
    ) -> Result<Evaluation, AppError> {
        submission.validate()?;

        let Resolved { course_id, passing_score } = self.resolve(container).await?;

        if !self.store.is_enrolled(learner_id, course_id).await? {
            return Err(AppError::Unauthorized("You are not enrolled in this course".to_string()));
        }

        let questions = self.store.list_questions(container).await?;
        let card = grading::score(&questions, &submission.answers);
        let percentage = grading::percentage(card.obtained_marks, card.total_marks);
        let passed = grading::is_passed(percentage, passing_score);

        let module_order: Vec<i64> = self
            .store
            .list_modules(course_id)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        let has_course_quiz = match container {
            ContainerRef::Course(_) => !questions.is_empty(),
            ContainerRef::Module(_) => !self
                .store
                .list_questions(ContainerRef::Course(course_id))
                .await?
                .is_empty(),
        };

        let mut tx = self.store.begin_attempt(learner_id, course_id).await?;

        let prior = tx.count_prior_attempts(container).await?;
        let submitted_at = chrono::Utc::now();
        let attempt = tx
            .append(NewAttempt {
                user_id: learner_id,
                container,
                course_id,
                answers: card.graded,
                score: card.obtained_marks,
                total_marks: card.total_marks,
                percentage,
                passed,
                passing_score,
                attempt_number: prior + 1,
                time_taken: submission.time_taken,
                status: submission.status,
                feedback: feedback(passed, percentage, passing_score),
                started_at: submitted_at - chrono::Duration::seconds(i64::from(submission.time_taken)),
                submitted_at,
            })
            .await?;

        let mut progress = tx.progress().await?;
        let mut points_awarded = 0;
        if passed {
            if let Some(progress) = progress.as_mut() {
                let unit = match container {
                    ContainerRef::Course(id) => SubUnit::Course(id),
                    ContainerRef::Module(id) => SubUnit::Module(id),
                };
                if progress.complete(unit, &module_order, has_course_quiz) {
                    tx.save_progress(progress).await?;
                    if card.obtained_marks > 0 {
                        tx.increment_cumulative_score(i64::from(card.obtained_marks)).await?;
                    }
                    points_awarded = card.obtained_marks;
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            "Learner {} attempt {} on {}:{} scored {}/{} ({:.1}%, {})",
            learner_id,
            attempt.record.attempt_number,
            container.kind(),
            container.id(),
            attempt.record.score,
            attempt.record.total_marks,
            percentage,
            attempt.result()
        );

        Ok(Evaluation { attempt, points_awarded, progress })
    }

    /// Attempt history for (learner, container), oldest first.
    pub async fn history(&self, container: ContainerRef, learner_id: i64) -> Result<Vec<Attempt>, AppError> {
        self.resolve(container).await?;
        self.store.list_attempts(learner_id, container).await
    }

    /// Highest-scoring attempt; the latest one wins ties.
    pub async fn best_attempt(&self, container: ContainerRef, learner_id: i64) -> Result<Option<Attempt>, AppError> {
        let attempts = self.history(container, learner_id).await?;
        Ok(attempts
            .into_iter()
            .max_by_key(|a| (a.record.score, a.record.attempt_number)))
    }
}

fn feedback(passed: bool, percentage: f64, passing_score: f64) -> String {
    if passed {
        format!("Great job! You passed with {:.0}%.", percentage)
    } else {
        format!(
            "You scored {:.0}%. You need {:.0}% to pass. Review the material and try again.",
            percentage, passing_score
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            attempt::{AnswerResponse, AttemptStatus, SubmittedAnswer},
            course::{AgeRange, Category, Difficulty, ModuleContent, ModuleType, NewCourse, NewModule},
            question::{NewQuestion, QuestionDifficulty, QuestionKind, QuestionOption},
            user::{NewUser, Role},
        },
        store::MemoryStore,
    };

    struct Fixture {
        store: Arc<dyn Store>,
        evaluator: AttemptEvaluator,
        learner: i64,
        course: i64,
        modules: Vec<i64>,
        questions: Vec<i64>,
    }

    /// A course with two modules; the first module has two 10-mark select questions.
    async fn fixture(enroll: bool) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let teacher = store
            .create_user(NewUser {
                name: "Teacher".to_string(),
                email: "teacher@example.com".to_string(),
                password_hash: "hash".to_string(),
                role: Role::Teacher,
                dob: None,
                class_standard: None,
                created_by: None,
            })
            .await
            .unwrap();
        let learner = store
            .create_user(NewUser {
                name: "Learner".to_string(),
                email: "learner@example.com".to_string(),
                password_hash: "hash".to_string(),
                role: Role::Student,
                dob: None,
                class_standard: Some("Class 7".to_string()),
                created_by: Some(teacher.id),
            })
            .await
            .unwrap();
        let course = store
            .create_course(NewCourse {
                title: "Earthquake Safety".to_string(),
                description: "Drop, cover, hold on".to_string(),
                created_by: teacher.id,
                category: Category::Earthquake,
                difficulty: Difficulty::Beginner,
                target_age: AgeRange::default(),
                estimated_duration: 20,
                tags: vec![],
                is_published: true,
                thumbnail_url: None,
                passing_score: 60.0,
            })
            .await
            .unwrap();

        let mut modules = Vec::new();
        for title in ["Before", "During"] {
            let module = store
                .create_module(NewModule {
                    course_id: course.id,
                    title: title.to_string(),
                    content: ModuleContent::default(),
                    order: None,
                    module_type: ModuleType::Lesson,
                    duration: 10,
                    learning_objectives: vec![],
                    is_published: true,
                    passing_score: 70.0,
                })
                .await
                .unwrap();
            modules.push(module.id);
        }

        let questions = store
            .add_questions(
                ContainerRef::Module(modules[0]),
                vec![select_question(0), select_question(2)],
            )
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.id)
            .collect();

        if enroll {
            store.enroll(learner.id, course.id, Some(modules[0])).await.unwrap();
        }

        Fixture {
            evaluator: AttemptEvaluator::new(store.clone()),
            store,
            learner: learner.id,
            course: course.id,
            modules,
            questions,
        }
    }

    fn select_question(correct: usize) -> NewQuestion {
        NewQuestion {
            question_text: "Pick one".to_string(),
            kind: QuestionKind::SingleChoice {
                options: (0..3)
                    .map(|i| QuestionOption { text: format!("Option {}", i), is_correct: i == correct })
                    .collect(),
            },
            explanation: None,
            marks: 10,
            difficulty: QuestionDifficulty::Easy,
            order: None,
            image_url: None,
            time_limit: 60,
        }
    }

    fn submission(picks: &[(i64, usize)]) -> SubmitAttemptRequest {
        SubmitAttemptRequest {
            answers: picks
                .iter()
                .map(|&(question_id, selected_option)| SubmittedAnswer {
                    question_id,
                    time_spent: 10,
                    response: AnswerResponse::SingleChoice { selected_option },
                })
                .collect(),
            time_taken: 30,
            status: AttemptStatus::Completed,
        }
    }

    async fn total_score(f: &Fixture) -> i64 {
        f.store.find_user(f.learner).await.unwrap().unwrap().total_score
    }

    #[tokio::test]
    async fn test_perfect_attempt_completes_module() {
        let f = fixture(true).await;
        let module = ContainerRef::Module(f.modules[0]);

        let eval = f
            .evaluator
            .evaluate(module, f.learner, submission(&[(f.questions[0], 0), (f.questions[1], 2)]))
            .await
            .unwrap();

        assert_eq!(eval.attempt.record.score, 20);
        assert_eq!(eval.attempt.record.percentage, 100.0);
        assert!(eval.attempt.record.passed);
        assert_eq!(eval.attempt.record.attempt_number, 1);
        assert_eq!(eval.points_awarded, 20);

        let progress = eval.progress.unwrap();
        assert!(progress.is_completed(SubUnit::Module(f.modules[0])));
        assert_eq!(progress.progress_percentage, 50.0);
        assert_eq!(progress.current_module, Some(f.modules[1]));
        assert_eq!(total_score(&f).await, 20);
    }

    #[tokio::test]
    async fn test_failed_attempt_leaves_progress_untouched() {
        let f = fixture(true).await;
        let module = ContainerRef::Module(f.modules[0]);

        let eval = f
            .evaluator
            .evaluate(module, f.learner, submission(&[(f.questions[0], 0), (f.questions[1], 1)]))
            .await
            .unwrap();

        assert_eq!(eval.attempt.record.score, 10);
        assert_eq!(eval.attempt.record.percentage, 50.0);
        assert!(!eval.attempt.record.passed);
        assert_eq!(eval.points_awarded, 0);
        assert!(eval.progress.unwrap().completed.is_empty());
        assert_eq!(total_score(&f).await, 0);
    }

    #[tokio::test]
    async fn test_attempt_numbers_increase_and_repass_awards_nothing() {
        let f = fixture(true).await;
        let module = ContainerRef::Module(f.modules[0]);
        let perfect = [(f.questions[0], 0), (f.questions[1], 2)];

        let first = f.evaluator.evaluate(module, f.learner, submission(&[(f.questions[0], 1)])).await.unwrap();
        let second = f.evaluator.evaluate(module, f.learner, submission(&perfect)).await.unwrap();
        let third = f.evaluator.evaluate(module, f.learner, submission(&perfect)).await.unwrap();

        assert!(!first.attempt.record.passed);
        assert_eq!(first.attempt.record.attempt_number, 1);
        assert_eq!(second.attempt.record.attempt_number, 2);
        assert_eq!(third.attempt.record.attempt_number, 3);
        assert_eq!(second.points_awarded, 20);
        assert_eq!(third.points_awarded, 0);
        assert_eq!(third.progress.unwrap().completed.len(), 1);
        assert_eq!(total_score(&f).await, 20);

        let history = f.evaluator.history(module, f.learner).await.unwrap();
        assert_eq!(history.len(), 3);
        let best = f.evaluator.best_attempt(module, f.learner).await.unwrap().unwrap();
        assert_eq!(best.record.attempt_number, 3);
    }

    #[tokio::test]
    async fn test_partial_answer_set_only_counts_answered_questions() {
        let f = fixture(true).await;
        let eval = f
            .evaluator
            .evaluate(ContainerRef::Module(f.modules[0]), f.learner, submission(&[(f.questions[0], 0)]))
            .await
            .unwrap();
        assert_eq!(eval.attempt.record.total_marks, 10);
        assert_eq!(eval.attempt.record.percentage, 100.0);
        assert!(eval.attempt.record.passed);
    }

    #[tokio::test]
    async fn test_not_enrolled_is_unauthorized_and_writes_nothing() {
        let f = fixture(false).await;
        let module = ContainerRef::Module(f.modules[0]);

        let err = f
            .evaluator
            .evaluate(module, f.learner, submission(&[(f.questions[0], 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(f.store.list_attempts(f.learner, module).await.unwrap().is_empty());
        assert_eq!(total_score(&f).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_container_is_not_found() {
        let f = fixture(true).await;
        let err = f
            .evaluator
            .evaluate(ContainerRef::Module(9999), f.learner, submission(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_submission_fails_with_zero() {
        let f = fixture(true).await;
        let eval = f
            .evaluator
            .evaluate(ContainerRef::Module(f.modules[0]), f.learner, submission(&[]))
            .await
            .unwrap();
        assert_eq!(eval.attempt.record.total_marks, 0);
        assert_eq!(eval.attempt.record.percentage, 0.0);
        assert!(!eval.attempt.record.passed);
    }

    #[tokio::test]
    async fn test_duplicate_question_ids_rejected_before_recording() {
        let f = fixture(true).await;
        let module = ContainerRef::Module(f.modules[0]);
        let err = f
            .evaluator
            .evaluate(module, f.learner, submission(&[(f.questions[0], 0), (f.questions[0], 0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(f.store.list_attempts(f.learner, module).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_submissions_are_serialized() {
        let f = fixture(true).await;
        let module = ContainerRef::Module(f.modules[0]);
        let perfect = [(f.questions[0], 0), (f.questions[1], 2)];

        let (a, b) = tokio::join!(
            f.evaluator.evaluate(module, f.learner, submission(&perfect)),
            f.evaluator.evaluate(module, f.learner, submission(&perfect)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let mut numbers = [a.attempt.record.attempt_number, b.attempt.record.attempt_number];
        numbers.sort();
        assert_eq!(numbers, [1, 2]);
        assert_eq!(a.points_awarded + b.points_awarded, 20);
        assert_eq!(total_score(&f).await, 20);
    }

    #[tokio::test]
    async fn test_course_quiz_counts_as_sub_unit() {
        let f = fixture(true).await;
        let course_quiz = f
            .store
            .add_questions(ContainerRef::Course(f.course), vec![select_question(1)])
            .await
            .unwrap();

        let eval = f
            .evaluator
            .evaluate(ContainerRef::Course(f.course), f.learner, submission(&[(course_quiz[0].id, 1)]))
            .await
            .unwrap();

        let progress = eval.progress.unwrap();
        assert!(progress.is_completed(SubUnit::Course(f.course)));
        // Two modules plus the course assessment.
        assert!((progress.progress_percentage - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(progress.current_module, Some(f.modules[0]));
    }
}
