// src/routes.rs

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, header},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, course, game, quiz, students},
    state::AppState,
    store::Store,
    utils::jwt::{admin_middleware, auth_middleware, teacher_middleware},
};

async fn index(State(store): State<Arc<dyn Store>>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Disaster preparedness learning API",
        "version": env!("CARGO_PKG_VERSION"),
        "store": store.backend(),
        "endpoints": {
            "auth": "/api/auth",
            "users": "/api/users",
            "courses": "/api/courses",
            "modules": "/api/modules",
            "leaderboard": "/api/leaderboard",
            "games": "/api/games",
        },
    }))
}

fn cors_layer(client_url: Option<&str>) -> CorsLayer {
    let mut origins = vec![
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];
    if let Some(url) = client_url {
        match url.parse() {
            Ok(origin) => origins.push(origin),
            Err(_) => tracing::warn!("Ignoring invalid CLIENT_URL {:?}", url),
        }
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// Public reads are merged with authenticated routes; authoring routes are
/// checked by role after the token (auth runs first as the outer layer).
pub fn create_router(state: AppState) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .route("/profile", put(auth::update_profile))
                .route("/password", put(auth::change_password))
                .route_layer(auth_layer.clone()),
        );

    let user_routes = Router::new()
        .route("/students", post(students::create_student))
        .route("/my-students", get(students::my_students))
        .route(
            "/students/{id}",
            put(students::update_student).delete(students::delete_student),
        )
        .route("/students/{id}/reset-password", put(students::reset_password))
        .route_layer(middleware::from_fn(teacher_middleware))
        .merge(
            Router::new()
                .route("/students", get(students::list_students))
                .route_layer(middleware::from_fn(admin_middleware)),
        )
        .route_layer(auth_layer.clone());

    let course_routes = Router::new()
        .route("/", get(course::list_courses))
        .route("/{id}", get(course::get_course))
        .route("/{id}/quiz", get(quiz::get_course_quiz))
        // Authoring, course author or admin
        .merge(
            Router::new()
                .route("/", post(course::create_course))
                .route("/{id}", put(course::update_course).delete(course::delete_course))
                .route("/{id}/modules", post(course::add_module))
                .route("/{id}/quiz", post(course::add_course_questions))
                .route_layer(middleware::from_fn(teacher_middleware))
                .route_layer(auth_layer.clone()),
        )
        // Learner routes
        .merge(
            Router::new()
                .route("/{id}/enroll", post(course::enroll))
                .route("/{id}/progress", get(course::get_progress))
                .route("/{id}/quiz/submit", post(quiz::submit_course_quiz))
                .route("/{id}/attempts", get(quiz::course_attempts))
                .route_layer(auth_layer.clone()),
        );

    let module_routes = Router::new()
        .route("/{id}/quiz", get(quiz::get_module_quiz))
        .merge(
            Router::new()
                .route("/{id}/quiz", post(course::add_module_questions))
                .route_layer(middleware::from_fn(teacher_middleware))
                .route_layer(auth_layer.clone()),
        )
        .merge(
            Router::new()
                .route("/{id}/submit", post(quiz::submit_module_quiz))
                .route("/{id}/attempts", get(quiz::module_attempts))
                .route("/{id}/attempts/best", get(quiz::best_module_attempt))
                .route_layer(auth_layer.clone()),
        );

    let game_routes = Router::new()
        .route("/story", post(game::start_story))
        .route("/story/choice", post(game::story_choice))
        .route("/scenario", post(game::start_scenario))
        .route("/scenario/submit", post(game::submit_scenario))
        .route("/kit", post(game::start_kit))
        .route("/kit/evaluate", post(game::evaluate_kit))
        .route("/stats", get(game::stats))
        .route_layer(auth_layer);

    let global_layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(state.config.client_url.as_deref()));

    Router::new()
        .route("/", get(index))
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/modules", module_routes)
        .route("/api/leaderboard", get(quiz::get_leaderboard))
        .nest("/api/games", game_routes)
        .layer(global_layers)
        .with_state(state)
}
