// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use prepared_backend::{
    config::Config, models::game::GameCatalog, routes, state::AppState, store::MemoryStore,
};
use serde_json::{Value, json};

/// Spawns the app on a random port over a fresh in-memory store.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
pub async fn spawn_app() -> String {
    let config = Config::for_tests("test_secret_for_integration_tests");
    let games = GameCatalog::builtin().expect("built-in game content");
    let state = AppState::new(Arc::new(MemoryStore::new()), config, games);

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

pub fn unique_email(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}@example.com", prefix, &id[..12])
}

/// Registers a teacher and returns (access token, user id).
pub async fn register_teacher(client: &reqwest::Client, address: &str) -> (String, i64) {
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({
            "name": "Test Teacher",
            "email": unique_email("teacher"),
            "password": "password123",
        }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.unwrap();
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

/// Creates a student owned by `teacher_token`, logs in, returns (access token, user id).
pub async fn create_student(client: &reqwest::Client, address: &str, teacher_token: &str) -> (String, i64) {
    let email = unique_email("student");
    let response = client
        .post(format!("{}/api/users/students", address))
        .bearer_auth(teacher_token)
        .json(&json!({
            "name": "Test Student",
            "email": email,
            "password": "student123",
            "dob": "2012-04-01",
            "class_standard": "Class 7",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let student: Value = response.json().await.unwrap();

    let token = login(client, address, &email, "student123").await;
    (token, student["id"].as_i64().unwrap())
}

pub async fn login(client: &reqwest::Client, address: &str, email: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    body["access_token"].as_str().unwrap().to_string()
}

/// A published course with `modules` modules, each carrying two 10-mark
/// single-choice questions whose correct options are 0 and 2.
/// Returns (course id, module ids).
pub async fn published_course(
    client: &reqwest::Client,
    address: &str,
    teacher_token: &str,
    modules: usize,
) -> (i64, Vec<i64>) {
    let response = client
        .post(format!("{}/api/courses", address))
        .bearer_auth(teacher_token)
        .json(&json!({
            "title": "Earthquake Basics",
            "description": "<p>Drop, cover and hold on.</p>",
            "category": "earthquake",
            "tags": ["Safety"],
            "is_published": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let course: Value = response.json().await.unwrap();
    let course_id = course["id"].as_i64().unwrap();

    let mut module_ids = Vec::new();
    for i in 0..modules {
        let response = client
            .post(format!("{}/api/courses/{}/modules", address, course_id))
            .bearer_auth(teacher_token)
            .json(&json!({ "title": format!("Module {}", i + 1), "is_published": true }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        let module: Value = response.json().await.unwrap();
        let module_id = module["id"].as_i64().unwrap();

        add_questions(client, address, teacher_token, &format!("modules/{}", module_id)).await;
        module_ids.push(module_id);
    }

    (course_id, module_ids)
}

/// Adds the two standard questions to `container` ("courses/1" or "modules/2").
pub async fn add_questions(client: &reqwest::Client, address: &str, token: &str, container: &str) -> Vec<i64> {
    let response = client
        .post(format!("{}/api/{}/quiz", address, container))
        .bearer_auth(token)
        .json(&json!({
            "questions": [
                {
                    "question_text": "What do you do when the ground shakes?",
                    "type": "single_choice",
                    "options": [
                        { "text": "Drop, cover and hold on", "is_correct": true },
                        { "text": "Run outside" },
                        { "text": "Use the elevator" }
                    ],
                    "marks": 10
                },
                {
                    "question_text": "Where is the safest place indoors?",
                    "type": "single_choice",
                    "options": [
                        { "text": "Next to a window" },
                        { "text": "On the stairs" },
                        { "text": "Under a sturdy table", "is_correct": true }
                    ],
                    "marks": 10
                }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let questions: Value = response.json().await.unwrap();
    questions
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_i64().unwrap())
        .collect()
}

pub fn answer(question_id: i64, option: usize) -> Value {
    json!({
        "question_id": question_id,
        "time_spent": 5,
        "response": { "type": "single_choice", "selected_option": option }
    })
}
