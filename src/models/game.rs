// src/models/game.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::progress::GameProgress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryChoice {
    pub id: u32,
    pub text: String,
    pub points: i64,
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub scenario: String,
    pub choices: Vec<StoryChoice>,
    pub next_scenario: String,
    pub next_choices: Vec<StoryChoice>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub facts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Essential,
    Useful,
    Optional,
    Incorrect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioItem {
    pub id: u32,
    pub name: String,
    pub category: ItemCategory,
    pub points: i64,
}

/// Drag-drop classification round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub title: String,
    pub description: String,
    pub available_items: Vec<ScenarioItem>,
    pub target_items: u32,
    /// Seconds.
    pub time_limit: u32,
    pub difficulty: String,
    #[serde(default)]
    pub tips: Vec<String>,
}

/// Item as shown while playing; category and points stay server-side.
#[derive(Debug, Clone, Serialize)]
pub struct PublicScenarioItem {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicScenario {
    pub title: String,
    pub description: String,
    pub available_items: Vec<PublicScenarioItem>,
    pub target_items: u32,
    pub time_limit: u32,
    pub difficulty: String,
    pub tips: Vec<String>,
}

impl From<&Scenario> for PublicScenario {
    fn from(s: &Scenario) -> Self {
        Self {
            title: s.title.clone(),
            description: s.description.clone(),
            available_items: s
                .available_items
                .iter()
                .map(|i| PublicScenarioItem { id: i.id, name: i.name.clone() })
                .collect(),
            target_items: s.target_items,
            time_limit: s.time_limit,
            difficulty: s.difficulty.clone(),
            tips: s.tips.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitItem {
    pub id: u32,
    pub name: String,
    pub cost: u32,
    /// Days of supply this item covers, for water and food.
    #[serde(default)]
    pub days: Option<u32>,
    pub essential: bool,
    pub category: String,
}

/// Budgeted emergency-kit round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitSet {
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub items: Vec<KitItem>,
}

/// All static game content, keyed by disaster type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameCatalog {
    pub stories: BTreeMap<String, Story>,
    pub scenarios: BTreeMap<String, Scenario>,
    pub kits: BTreeMap<String, KitSet>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartStoryRequest {
    #[validate(length(max = 40))]
    pub disaster_type: Option<String>,
    #[validate(range(min = 3, max = 120))]
    pub user_age: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StoryChoiceRequest {
    #[validate(length(max = 100))]
    pub game_id: Option<String>,
    #[validate(length(max = 40))]
    pub disaster_type: Option<String>,
    pub choice_id: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartScenarioRequest {
    #[validate(length(max = 40))]
    pub disaster_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScenarioSubmitRequest {
    #[validate(length(max = 100))]
    pub game_id: Option<String>,
    #[validate(length(max = 40))]
    pub disaster_type: Option<String>,
    #[validate(length(max = 100))]
    pub selected_items: Vec<u32>,
    /// Seconds.
    #[validate(range(max = 86400))]
    pub time_taken: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartKitRequest {
    #[validate(range(min = 1, max = 100000))]
    pub budget: Option<u32>,
    #[validate(range(min = 1, max = 50))]
    pub family_size: Option<u32>,
    #[validate(length(max = 40))]
    pub disaster_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct KitEvaluateRequest {
    #[validate(length(max = 100))]
    pub game_id: Option<String>,
    #[validate(length(max = 40))]
    pub disaster_type: Option<String>,
    #[validate(length(max = 100))]
    pub selected_items: Vec<u32>,
    #[validate(range(min = 1, max = 100000))]
    pub budget: Option<u32>,
    #[validate(range(min = 1, max = 50))]
    pub family_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryOutcome {
    pub choice_id: u32,
    pub points_earned: i64,
    pub outcome: String,
    pub feedback: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioOutcome {
    pub score: i64,
    pub correct_items: u32,
    pub incorrect_items: u32,
    pub time_bonus: i64,
    pub overall: &'static str,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KitEvaluation {
    pub water_days: u32,
    pub food_days: u32,
    pub has_flashlight: bool,
    pub has_first_aid: bool,
    pub has_radio: bool,
    pub total_cost: u32,
    pub budget_used_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KitOutcome {
    pub score: i64,
    pub evaluation: KitEvaluation,
    pub essentials_covered: u32,
    pub survival_days: u32,
    pub feedback: Vec<String>,
    pub grade: &'static str,
}

#[derive(Debug, Serialize)]
pub struct GameStats {
    pub total_score: i64,
    pub games_played: u32,
    pub game_progress: Vec<GameProgress>,
    pub achievements: Vec<&'static str>,
    pub rank: &'static str,
}
