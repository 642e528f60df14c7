// tests/api_tests.rs

mod common;

use common::{create_student, login, register_teacher, spawn_app, unique_email};
use serde_json::{Value, json};

#[tokio::test]
async fn health_check_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn banner_reports_store_backend() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let body: Value = client.get(&address).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn register_and_login_work() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("Teacher");

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({ "name": "Asha", "email": email, "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["role"], "teacher");
    assert_eq!(body["user"]["email"], email.to_lowercase());
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["type"], "Bearer");

    // Emails are case-insensitive.
    let token = login(&client, &address, &email.to_uppercase(), "password123").await;
    assert!(!token.is_empty());

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "email": email, "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "auth_error");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let payload = json!({ "name": "Asha", "email": unique_email("dup"), "password": "password123" });

    let first = client
        .post(format!("{}/api/auth/register", address))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 201);

    let second = client
        .post(format!("{}/api/auth/register", address))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
async fn students_cannot_self_register() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({
            "name": "Kid",
            "email": unique_email("kid"),
            "password": "password123",
            "role": "student",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn register_validation_fails() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({ "name": "A", "email": "not-an-email", "password": "123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn refresh_token_issues_new_pair() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({ "name": "Asha", "email": unique_email("refresh"), "password": "password123" }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    let access = body["access_token"].as_str().unwrap().to_string();
    let refresh = body["refresh_token"].as_str().unwrap().to_string();

    let response = client
        .post(format!("{}/api/auth/refresh", address))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // An access token is not a refresh token.
    let response = client
        .post(format!("{}/api/auth/refresh", address))
        .json(&json!({ "refresh_token": access }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn protected_routes_require_token() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/api/auth/me", address)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .get(format!("{}/api/auth/me", address))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn profile_and_password_updates() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("profile");

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({ "name": "Asha", "email": email, "password": "password123" }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    let token = body["access_token"].as_str().unwrap().to_string();

    let response = client
        .put(format!("{}/api/auth/profile", address))
        .bearer_auth(&token)
        .json(&json!({ "name": "Asha Rao", "region": { "state": "Kerala", "district": "Kochi" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let me: Value = client
        .get(format!("{}/api/auth/me", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["name"], "Asha Rao");
    assert_eq!(me["region"]["district"], "Kochi");
    assert_eq!(me["course_progress"], json!([]));

    let response = client
        .put(format!("{}/api/auth/password", address))
        .bearer_auth(&token)
        .json(&json!({ "current_password": "nope", "new_password": "newpass123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .put(format!("{}/api/auth/password", address))
        .bearer_auth(&token)
        .json(&json!({ "current_password": "password123", "new_password": "newpass123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    login(&client, &address, &email, "newpass123").await;
}

#[tokio::test]
async fn teacher_manages_own_students() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, teacher_id) = register_teacher(&client, &address).await;
    let (other_teacher, _) = register_teacher(&client, &address).await;
    let (student_token, student_id) = create_student(&client, &address, &teacher).await;

    let mine: Value = client
        .get(format!("{}/api/users/my-students", address))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["created_by"], teacher_id);
    assert_eq!(mine[0]["class_standard"], "Class 7");

    // Only the creator (or an admin) may modify the student.
    let response = client
        .put(format!("{}/api/users/students/{}", address, student_id))
        .bearer_auth(&other_teacher)
        .json(&json!({ "name": "Renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .put(format!("{}/api/users/students/{}", address, student_id))
        .bearer_auth(&teacher)
        .json(&json!({ "name": "Renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Renamed");

    // Students cannot manage accounts or list everyone.
    let response = client
        .get(format!("{}/api/users/my-students", address))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .get(format!("{}/api/users/students", address))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .delete(format!("{}/api/users/students/{}", address, student_id))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .delete(format!("{}/api/users/students/{}", address, student_id))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn reset_password_lets_student_log_in_again() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;

    let email = unique_email("reset");
    let response = client
        .post(format!("{}/api/users/students", address))
        .bearer_auth(&teacher)
        .json(&json!({
            "name": "Ravi",
            "email": email,
            "password": "student123",
            "dob": "2011-09-15",
            "class_standard": "Grade 8",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let student: Value = response.json().await.unwrap();

    let response = client
        .put(format!("{}/api/users/students/{}/reset-password", address, student["id"]))
        .bearer_auth(&teacher)
        .json(&json!({ "new_password": "fresh-pass" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    login(&client, &address, &email, "fresh-pass").await;
}

#[tokio::test]
async fn create_student_requires_all_fields() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (teacher, _) = register_teacher(&client, &address).await;

    let response = client
        .post(format!("{}/api/users/students", address))
        .bearer_auth(&teacher)
        .json(&json!({
            "name": "Ravi",
            "email": unique_email("partial"),
            "password": "student123",
            "dob": "2011-09-15",
            "class_standard": "Year Nine",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}
