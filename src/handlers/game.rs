// src/handlers/game.rs

//! Mini-game sessions. Content and scoring tables live server-side; the client
//! only ever sends ids.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, State, rejection::JsonRejection},
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::auth::current_user,
    models::{
        game::{
            GameCatalog, KitEvaluateRequest, PublicScenario, ScenarioSubmitRequest,
            StartKitRequest, StartScenarioRequest, StartStoryRequest, StoryChoiceRequest,
        },
        progress::{GameType, GameUpdate},
    },
    services::games::{
        self, DEFAULT_FAMILY_SIZE, DEFAULT_KIT_BUDGET, STORY_BASE_POINTS,
    },
    store::Store,
    utils::jwt::Claims,
};

const STORY_DURATION_MINUTES: u32 = 10;
const STORY_MAX_POINTS: u32 = 50;

const KIT_RECOMMENDATIONS: [&str; 5] = [
    "Remember: 1 gallon of water per person per day",
    "Non-perishable food for at least 3 days",
    "Battery-powered or hand crank radio for emergency information",
    "Flashlight and extra batteries",
    "First aid kit and medications",
];

fn game_id(kind: &str, disaster: &str) -> String {
    format!("{}_{}_{}", kind, disaster, chrono::Utc::now().timestamp_millis())
}

/// Opens a story; each opening bumps the story level and adds base points to the game score.
pub async fn start_story(
    State(store): State<Arc<dyn Store>>,
    State(catalog): State<Arc<GameCatalog>>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<StartStoryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let (disaster, story) = catalog.story(payload.disaster_type.as_deref())?;
    let (entry, _) = store
        .apply_game_update(
            claims.user_id()?,
            GameType::Story,
            GameUpdate::Start { level_up: true, base_points: STORY_BASE_POINTS },
        )
        .await?;

    Ok(Json(json!({
        "game_type": "story",
        "disaster_type": disaster,
        "story": story,
        "user_level": entry.level,
        "game_id": game_id("story", disaster),
        "estimated_duration": STORY_DURATION_MINUTES,
        "max_points": STORY_MAX_POINTS,
    })))
}

pub async fn story_choice(
    State(store): State<Arc<dyn Store>>,
    State(catalog): State<Arc<GameCatalog>>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<StoryChoiceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let (_, story) = catalog.story(payload.disaster_type.as_deref())?;
    let outcome = games::score_story_choice(story, payload.choice_id)?;

    let (entry, total_score) = store
        .apply_game_update(
            claims.user_id()?,
            GameType::Story,
            GameUpdate::Finish { points: outcome.points_earned },
        )
        .await?;

    Ok(Json(json!({
        "choice_id": outcome.choice_id,
        "points_earned": outcome.points_earned,
        "outcome": outcome.outcome,
        "feedback": outcome.feedback,
        "game_score": entry.score,
        "total_score": total_score,
        "continue_game": true,
    })))
}

/// Opens a drag-drop round. Item categories and points are withheld.
pub async fn start_scenario(
    State(store): State<Arc<dyn Store>>,
    State(catalog): State<Arc<GameCatalog>>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<StartScenarioRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let (disaster, scenario) = catalog.scenario(payload.disaster_type.as_deref())?;
    let (entry, _) = store
        .apply_game_update(
            claims.user_id()?,
            GameType::Scenario,
            GameUpdate::Start { level_up: false, base_points: 0 },
        )
        .await?;

    Ok(Json(json!({
        "game_type": "scenario",
        "disaster_type": disaster,
        "scenario": PublicScenario::from(scenario),
        "game_id": game_id("scenario", disaster),
        "user_level": entry.level,
        "instructions": "Drag the correct items to the emergency kit area. Avoid incorrect items!",
    })))
}

pub async fn submit_scenario(
    State(store): State<Arc<dyn Store>>,
    State(catalog): State<Arc<GameCatalog>>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<ScenarioSubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let (_, scenario) = catalog.scenario(payload.disaster_type.as_deref())?;
    let outcome = games::score_scenario(scenario, &payload.selected_items, payload.time_taken)?;

    let (entry, total_score) = store
        .apply_game_update(
            claims.user_id()?,
            GameType::Scenario,
            GameUpdate::Finish { points: outcome.score },
        )
        .await?;

    tracing::info!("User {} scored {} in scenario game", claims.sub, outcome.score);
    Ok(Json(json!({
        "score": outcome.score,
        "correct_items": outcome.correct_items,
        "incorrect_items": outcome.incorrect_items,
        "time_bonus": outcome.time_bonus,
        "feedback": {
            "overall": outcome.overall,
            "details": outcome.details,
        },
        "game_score": entry.score,
        "total_score": total_score,
    })))
}

/// Opens a kit-building round with the item table and a budget.
pub async fn start_kit(
    State(store): State<Arc<dyn Store>>,
    State(catalog): State<Arc<GameCatalog>>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<StartKitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let budget = payload.budget.unwrap_or(DEFAULT_KIT_BUDGET);
    let family_size = payload.family_size.unwrap_or(DEFAULT_FAMILY_SIZE);
    let (disaster, kit) = catalog.kit(payload.disaster_type.as_deref())?;

    let (entry, _) = store
        .apply_game_update(
            claims.user_id()?,
            GameType::Kit,
            GameUpdate::Start { level_up: false, base_points: 0 },
        )
        .await?;

    Ok(Json(json!({
        "game_type": "kit",
        "disaster_type": disaster,
        "budget": budget,
        "family_size": family_size,
        "kit_data": kit,
        "game_id": game_id("kit", disaster),
        "objective": format!(
            "Build the best {} emergency kit within your ${} budget to keep your family of {} safe for at least 72 hours.",
            disaster, budget, family_size
        ),
        "user_level": entry.level,
        "recommendation": kit.recommendation,
        "tips": [
            "Essential items should be prioritized over optional ones",
            "Consider cost-effectiveness: days of survival per dollar spent",
            format!("For {} disasters: {}", disaster, kit.recommendation),
            "Don't forget about special needs (babies, elderly, pets, medications)",
        ],
    })))
}

/// Scores a kit. Item costs come from the kit table, not the client.
pub async fn evaluate_kit(
    State(store): State<Arc<dyn Store>>,
    State(catalog): State<Arc<GameCatalog>>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<KitEvaluateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    payload.validate()?;

    let (_, kit) = catalog.kit(payload.disaster_type.as_deref())?;
    let budget = payload.budget.unwrap_or(DEFAULT_KIT_BUDGET);
    let outcome = games::evaluate_kit(kit, &payload.selected_items, budget)?;

    let (entry, total_score) = store
        .apply_game_update(
            claims.user_id()?,
            GameType::Kit,
            GameUpdate::Finish { points: outcome.score },
        )
        .await?;

    Ok(Json(json!({
        "score": outcome.score,
        "evaluation": outcome.evaluation,
        "essentials_covered": outcome.essentials_covered,
        "survival_days": outcome.survival_days,
        "feedback": outcome.feedback,
        "grade": outcome.grade,
        "family_size": payload.family_size.unwrap_or(DEFAULT_FAMILY_SIZE),
        "game_score": entry.score,
        "total_score": total_score,
        "recommendations": KIT_RECOMMENDATIONS,
    })))
}

pub async fn stats(
    State(store): State<Arc<dyn Store>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = current_user(store.as_ref(), &claims).await?;
    let entries = store.game_progress(user.id).await?;
    Ok(Json(games::game_stats(user.total_score, entries)))
}
