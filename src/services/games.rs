// src/services/games.rs

//! Scoring for the three mini-games. Everything here is pure; handlers apply
//! the resulting point deltas through the store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::{
    error::AppError,
    models::{
        game::{
            GameCatalog, GameStats, ItemCategory, KitEvaluation, KitOutcome, KitSet, Scenario,
            ScenarioOutcome, Story, StoryOutcome,
        },
        progress::{GameProgress, GameType},
    },
};

pub const DEFAULT_STORY: &str = "earthquake";
pub const DEFAULT_SCENARIO: &str = "earthquake";
pub const DEFAULT_KIT: &str = "general";
pub const DEFAULT_KIT_BUDGET: u32 = 150;
pub const DEFAULT_FAMILY_SIZE: u32 = 4;

/// Base points added to the story game score each time a story is opened.
pub const STORY_BASE_POINTS: i64 = 5;

const BUILTIN_CATALOG: &str = include_str!("../../content/games.json");

impl GameCatalog {
    pub fn builtin() -> Result<Self, AppError> {
        serde_json::from_str(BUILTIN_CATALOG)
            .map_err(|e| AppError::InternalServerError(format!("Built-in game content is invalid: {}", e)))
    }

    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(path).await?;
        let catalog: GameCatalog = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::InternalServerError(format!("Invalid game content {:?}: {}", path, e)))?;
        tracing::info!(
            "Loaded game content from {:?}: {} stories, {} scenarios, {} kits",
            path,
            catalog.stories.len(),
            catalog.scenarios.len(),
            catalog.kits.len()
        );
        Ok(catalog)
    }

    /// Story for `disaster`, falling back to the earthquake story.
    pub fn story(&self, disaster: Option<&str>) -> Result<(&str, &Story), AppError> {
        lookup(&self.stories, disaster, DEFAULT_STORY, "Story")
    }

    pub fn scenario(&self, disaster: Option<&str>) -> Result<(&str, &Scenario), AppError> {
        lookup(&self.scenarios, disaster, DEFAULT_SCENARIO, "Scenario")
    }

    pub fn kit(&self, disaster: Option<&str>) -> Result<(&str, &KitSet), AppError> {
        lookup(&self.kits, disaster, DEFAULT_KIT, "Kit")
    }
}

fn lookup<'a, T>(
    map: &'a BTreeMap<String, T>,
    key: Option<&str>,
    fallback: &str,
    what: &str,
) -> Result<(&'a str, &'a T), AppError> {
    key.map(|k| k.trim().to_lowercase())
        .and_then(|k| map.get_key_value(k.as_str()))
        .or_else(|| map.get_key_value(fallback))
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| AppError::NotFound(format!("{} content not found", what)))
}

/// Unique ids in first-seen order.
fn dedup(ids: &[u32]) -> Vec<u32> {
    let mut seen = BTreeSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

pub fn score_story_choice(story: &Story, choice_id: u32) -> Result<StoryOutcome, AppError> {
    let choice = story
        .choices
        .iter()
        .chain(story.next_choices.iter())
        .find(|c| c.id == choice_id)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown choice {} for this story", choice_id)))?;

    let feedback = if choice.points > 5 {
        "Excellent choice!"
    } else if choice.points > 0 {
        "Good thinking!"
    } else {
        "Let's learn from this choice!"
    };

    Ok(StoryOutcome {
        choice_id,
        points_earned: choice.points,
        outcome: choice.outcome.clone(),
        feedback,
    })
}

/// Seconds-based bonus for finishing a scenario quickly.
pub fn time_bonus(time_taken: u32) -> i64 {
    if time_taken < 180 {
        10
    } else if time_taken < 240 {
        5
    } else {
        0
    }
}

/// Scores a drag-drop round from the scenario's own item table.
pub fn score_scenario(scenario: &Scenario, selected: &[u32], time_taken: u32) -> Result<ScenarioOutcome, AppError> {
    let mut score = 0;
    let mut correct_items = 0;
    let mut incorrect_items = 0;

    for id in dedup(selected) {
        let item = scenario
            .available_items
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown item {} for this scenario", id)))?;

        match item.category {
            ItemCategory::Essential => {
                score += item.points;
                correct_items += 1;
            }
            ItemCategory::Useful => score += item.points,
            ItemCategory::Optional => {}
            ItemCategory::Incorrect => {
                score += item.points;
                incorrect_items += 1;
            }
        }
    }

    let time_bonus = time_bonus(time_taken);
    score += time_bonus;

    let overall = if score > 40 {
        "Excellent!"
    } else if score > 20 {
        "Good job!"
    } else {
        "Keep learning!"
    };

    Ok(ScenarioOutcome {
        score,
        correct_items,
        incorrect_items,
        time_bonus,
        overall,
        details: format!("You selected {} essential items correctly.", correct_items),
    })
}

pub fn kit_grade(score: i64) -> &'static str {
    match score {
        s if s >= 70 => "A",
        s if s >= 50 => "B",
        s if s >= 30 => "C",
        _ => "D",
    }
}

/// Scores an emergency kit. Costs come from the kit table; `budget` must be positive.
pub fn evaluate_kit(kit: &KitSet, selected: &[u32], budget: u32) -> Result<KitOutcome, AppError> {
    if budget == 0 {
        return Err(AppError::BadRequest("Budget must be positive".to_string()));
    }

    let mut score: i64 = 0;
    let mut essentials_covered = 0;
    let mut evaluation = KitEvaluation::default();

    for id in dedup(selected) {
        let item = kit
            .items
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown item {} for this kit", id)))?;

        if item.essential {
            score += 10;
            essentials_covered += 1;
        }

        let name = item.name.to_lowercase();
        let days = item.days.unwrap_or(0);
        if name.contains("water") {
            evaluation.water_days += days;
        }
        if name.contains("food") || name.contains("meal") {
            evaluation.food_days += days;
        }
        evaluation.has_flashlight |= name.contains("flashlight");
        evaluation.has_first_aid |= name.contains("first aid");
        evaluation.has_radio |= name.contains("radio");
        evaluation.total_cost += item.cost;
    }

    let survival_days = evaluation.water_days.min(evaluation.food_days);
    if survival_days >= 3 {
        score += 20;
    } else if survival_days >= 1 {
        score += 10;
    }

    for flag in [evaluation.has_flashlight, evaluation.has_first_aid, evaluation.has_radio] {
        if flag {
            score += 10;
        }
    }

    evaluation.budget_used_percentage = 100.0 * f64::from(evaluation.total_cost) / f64::from(budget);
    if (80.0..=100.0).contains(&evaluation.budget_used_percentage) {
        score += 15;
    } else if evaluation.budget_used_percentage > 100.0 {
        score -= 10;
    }

    let mut feedback = Vec::with_capacity(3);
    feedback.push(if survival_days >= 3 {
        "Great! Your kit can sustain your family for 3+ days".to_string()
    } else {
        "Your kit may not last 72 hours - consider more water/food".to_string()
    });
    feedback.push(if essentials_covered >= 4 {
        "You covered most essential categories".to_string()
    } else {
        "You're missing some essential items".to_string()
    });
    feedback.push(if evaluation.total_cost <= budget {
        "You stayed within budget".to_string()
    } else {
        "You went over budget".to_string()
    });

    Ok(KitOutcome {
        score,
        evaluation,
        essentials_covered,
        survival_days,
        feedback,
        grade: kit_grade(score),
    })
}

pub fn rank(total_score: i64) -> &'static str {
    match total_score {
        s if s >= 1000 => "Expert",
        s if s >= 500 => "Advanced",
        s if s >= 200 => "Intermediate",
        _ => "Beginner",
    }
}

pub fn achievements(entries: &[GameProgress], total_score: i64) -> Vec<&'static str> {
    let plays = |game_type: GameType| {
        entries
            .iter()
            .filter(|e| e.game_type == game_type)
            .map(|e| e.plays)
            .sum::<u32>()
    };

    let mut earned = Vec::new();
    if plays(GameType::Story) >= 5 {
        earned.push("Story Master");
    }
    if plays(GameType::Scenario) >= 3 {
        earned.push("Scenario Expert");
    }
    if plays(GameType::Kit) >= 1 {
        earned.push("Kit Builder");
    }
    if total_score >= 100 {
        earned.push("Century Club");
    }
    earned
}

pub fn game_stats(total_score: i64, entries: Vec<GameProgress>) -> GameStats {
    GameStats {
        total_score,
        games_played: entries.iter().map(|e| e.plays).sum(),
        achievements: achievements(&entries, total_score),
        rank: rank(total_score),
        game_progress: entries,
    }
}
