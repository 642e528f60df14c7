// tests/quiz_tests.rs

mod common;

use common::{add_questions, answer, create_student, published_course, register_teacher, spawn_app};
use serde_json::{Value, json};

async fn module_question_ids(client: &reqwest::Client, address: &str, module_id: i64) -> Vec<i64> {
    let quiz: Value = client
        .get(format!("{}/api/modules/{}/quiz", address, module_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    quiz.as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_i64().unwrap())
        .collect()
}

async fn enroll(client: &reqwest::Client, address: &str, token: &str, course_id: i64) -> reqwest::Response {
    client
        .post(format!("{}/api/courses/{}/enroll", address, course_id))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
}

async fn submit_module(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    module_id: i64,
    answers: Vec<Value>,
) -> reqwest::Response {
    client
        .post(format!("{}/api/modules/{}/submit", address, module_id))
        .bearer_auth(token)
        .json(&json!({ "answers": answers, "time_taken": 42 }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn public_quiz_hides_answers() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (_, modules) = published_course(&client, &address, &teacher, 1).await;

    let quiz: Value = client
        .get(format!("{}/api/modules/{}/quiz", address, modules[0]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first = &quiz[0];
    assert_eq!(first["type"], "single_choice");
    assert_eq!(first["options"].as_array().unwrap().len(), 3);
    assert!(first["options"][0].get("is_correct").is_none());
    assert!(first.get("explanation").is_none());

    let response = client
        .get(format!("{}/api/modules/999999/quiz", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn course_listing_filters_and_paginates() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    published_course(&client, &address, &teacher, 0).await;
    published_course(&client, &address, &teacher, 0).await;

    // Drafts are not listed.
    client
        .post(format!("{}/api/courses", address))
        .bearer_auth(&teacher)
        .json(&json!({ "title": "Draft", "description": "Not yet", "category": "flood" }))
        .send()
        .await
        .unwrap();

    let page: Value = client
        .get(format!("{}/api/courses?limit=1&page=2", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["count"], 1);

    let page: Value = client
        .get(format!("{}/api/courses?category=flood", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 0);

    let page: Value = client
        .get(format!("{}/api/courses?search=safety", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 2);

    // A page far past the end is empty, not an error.
    let response = client
        .get(format!("{}/api/courses?page=4294967295", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let page: Value = response.json().await.unwrap();
    assert_eq!(page["count"], 0);
    assert_eq!(page["data"], json!([]));
}

#[tokio::test]
async fn students_cannot_author_courses() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (student, _) = create_student(&client, &address, &teacher).await;

    let response = client
        .post(format!("{}/api/courses", address))
        .bearer_auth(&student)
        .json(&json!({ "title": "Mine", "description": "Nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn only_author_can_edit_course() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (other, _) = register_teacher(&client, &address).await;
    let (course_id, _) = published_course(&client, &address, &teacher, 0).await;

    let response = client
        .put(format!("{}/api/courses/{}", address, course_id))
        .bearer_auth(&other)
        .json(&json!({ "title": "Hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .put(format!("{}/api/courses/{}", address, course_id))
        .bearer_auth(&teacher)
        .json(&json!({ "title": "Earthquake Basics, 2nd edition" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["title"], "Earthquake Basics, 2nd edition");
}

#[tokio::test]
async fn enrollment_starts_at_first_module() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (student, _) = create_student(&client, &address, &teacher).await;
    let (course_id, modules) = published_course(&client, &address, &teacher, 2).await;

    let response = enroll(&client, &address, &student, course_id).await;
    assert_eq!(response.status().as_u16(), 201);
    let progress: Value = response.json().await.unwrap();
    assert_eq!(progress["current_module"], modules[0]);
    assert_eq!(progress["progress_percentage"], 0.0);

    let response = enroll(&client, &address, &student, course_id).await;
    assert_eq!(response.status().as_u16(), 409);

    // Teachers do not enroll.
    let response = enroll(&client, &address, &teacher, course_id).await;
    assert_eq!(response.status().as_u16(), 403);

    let course: Value = client
        .get(format!("{}/api/courses/{}", address, course_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(course["enrolled_count"], 1);
    assert_eq!(course["modules"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn passing_module_quiz_advances_progress_and_score() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (student, _) = create_student(&client, &address, &teacher).await;
    let (course_id, modules) = published_course(&client, &address, &teacher, 2).await;
    enroll(&client, &address, &student, course_id).await;
    let q = module_question_ids(&client, &address, modules[0]).await;

    let response = submit_module(&client, &address, &student, modules[0], vec![answer(q[0], 0), answer(q[1], 2)]).await;
    assert_eq!(response.status().as_u16(), 200);
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["score"], 20);
    assert_eq!(result["total_marks"], 20);
    assert_eq!(result["percentage"], 100.0);
    assert_eq!(result["passed"], true);
    assert_eq!(result["attempt_number"], 1);
    assert_eq!(result["points_awarded"], 20);
    assert_eq!(result["progress"]["progress_percentage"], 50.0);
    assert_eq!(result["progress"]["current_module"], modules[1]);

    // A repeat pass records the attempt but credits nothing.
    let response = submit_module(&client, &address, &student, modules[0], vec![answer(q[0], 0), answer(q[1], 2)]).await;
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["attempt_number"], 2);
    assert_eq!(result["points_awarded"], 0);

    let leaderboard: Value = client
        .get(format!("{}/api/leaderboard", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(leaderboard[0]["name"], "Test Student");
    assert_eq!(leaderboard[0]["total_score"], 20);
}

#[tokio::test]
async fn failed_attempt_is_recorded_without_progress() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (student, _) = create_student(&client, &address, &teacher).await;
    let (course_id, modules) = published_course(&client, &address, &teacher, 1).await;
    enroll(&client, &address, &student, course_id).await;
    let q = module_question_ids(&client, &address, modules[0]).await;

    let response = submit_module(&client, &address, &student, modules[0], vec![answer(q[0], 0), answer(q[1], 1)]).await;
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["percentage"], 50.0);
    assert_eq!(result["passed"], false);
    assert_eq!(result["result"], "Fail");
    assert_eq!(result["points_awarded"], 0);
    assert!(result["feedback"].as_str().unwrap().contains("You need 70% to pass"));

    let progress: Value = client
        .get(format!("{}/api/courses/{}/progress", address, course_id))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(progress["progress_percentage"], 0.0);
    assert_eq!(progress["completed"], json!([]));

    let history: Value = client
        .get(format!("{}/api/modules/{}/attempts", address, modules[0]))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn best_attempt_prefers_highest_score() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (student, _) = create_student(&client, &address, &teacher).await;
    let (course_id, modules) = published_course(&client, &address, &teacher, 1).await;
    enroll(&client, &address, &student, course_id).await;
    let q = module_question_ids(&client, &address, modules[0]).await;

    let response = client
        .get(format!("{}/api/modules/{}/attempts/best", address, modules[0]))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    submit_module(&client, &address, &student, modules[0], vec![answer(q[0], 0), answer(q[1], 2)]).await;
    submit_module(&client, &address, &student, modules[0], vec![answer(q[0], 1)]).await;

    let best: Value = client
        .get(format!("{}/api/modules/{}/attempts/best", address, modules[0]))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(best["attempt_number"], 1);
    assert_eq!(best["score"], 20);
}

#[tokio::test]
async fn submission_requires_enrollment() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (student, _) = create_student(&client, &address, &teacher).await;
    let (_, modules) = published_course(&client, &address, &teacher, 1).await;
    let q = module_question_ids(&client, &address, modules[0]).await;

    let response = submit_module(&client, &address, &student, modules[0], vec![answer(q[0], 0)]).await;
    assert_eq!(response.status().as_u16(), 403);

    let history: Value = client
        .get(format!("{}/api/modules/{}/attempts", address, modules[0]))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn malformed_submission_rejected() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (student, _) = create_student(&client, &address, &teacher).await;
    let (course_id, modules) = published_course(&client, &address, &teacher, 1).await;
    enroll(&client, &address, &student, course_id).await;
    let q = module_question_ids(&client, &address, modules[0]).await;

    let response = client
        .post(format!("{}/api/modules/{}/submit", address, modules[0]))
        .bearer_auth(&student)
        .json(&json!({ "answers": "everything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "validation_error");

    let response = submit_module(&client, &address, &student, modules[0], vec![answer(q[0], 0), answer(q[0], 0)]).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = submit_module(&client, &address, &student, 999999, vec![]).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn course_assessment_completes_course() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;
    let (student, _) = create_student(&client, &address, &teacher).await;
    let (course_id, modules) = published_course(&client, &address, &teacher, 1).await;
    let course_q = add_questions(&client, &address, &teacher, &format!("courses/{}", course_id)).await;
    enroll(&client, &address, &student, course_id).await;
    let module_q = module_question_ids(&client, &address, modules[0]).await;

    submit_module(&client, &address, &student, modules[0], vec![answer(module_q[0], 0), answer(module_q[1], 2)]).await;

    // 10 of 20 is 50%, below the course's 60% threshold.
    let response = client
        .post(format!("{}/api/courses/{}/quiz/submit", address, course_id))
        .bearer_auth(&student)
        .json(&json!({ "answers": [answer(course_q[0], 0), answer(course_q[1], 0)], "time_taken": 30 }))
        .send()
        .await
        .unwrap();
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["score"], 10);
    assert_eq!(result["passed"], false);

    let response = client
        .post(format!("{}/api/courses/{}/quiz/submit", address, course_id))
        .bearer_auth(&student)
        .json(&json!({ "answers": [answer(course_q[0], 0), answer(course_q[1], 2)], "time_taken": 30 }))
        .send()
        .await
        .unwrap();
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["passed"], true);
    assert_eq!(result["attempt_number"], 2);
    assert_eq!(result["progress"]["progress_percentage"], 100.0);

    let attempts: Value = client
        .get(format!("{}/api/courses/{}/attempts", address, course_id))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(attempts.as_array().unwrap().len(), 2);

    let me: Value = client
        .get(format!("{}/api/auth/me", address))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["total_score"], 40);
}
