// src/models/progress.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A completable piece of a course: one of its modules, or its own assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SubUnit {
    Course(i64),
    Module(i64),
}

impl fmt::Display for SubUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubUnit::Course(id) => write!(f, "course:{}", id),
            SubUnit::Module(id) => write!(f, "module:{}", id),
        }
    }
}

impl FromStr for SubUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("malformed sub-unit '{}'", s))?;
        let id = id
            .parse::<i64>()
            .map_err(|_| format!("malformed sub-unit id in '{}'", s))?;
        match kind {
            "course" => Ok(SubUnit::Course(id)),
            "module" => Ok(SubUnit::Module(id)),
            _ => Err(format!("unknown sub-unit kind in '{}'", s)),
        }
    }
}

/// Per-learner, per-course progress. Created empty on enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub user_id: i64,
    pub course_id: i64,
    /// Completed sub-units, unique, in completion order.
    pub completed: Vec<SubUnit>,
    /// First module not yet completed, in module order.
    pub current_module: Option<i64>,
    pub progress_percentage: f64,
    pub enrolled_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl CourseProgress {
    pub fn new(user_id: i64, course_id: i64, first_module: Option<i64>) -> Self {
        let now = chrono::Utc::now();
        Self {
            user_id,
            course_id,
            completed: Vec::new(),
            current_module: first_module,
            progress_percentage: 0.0,
            enrolled_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, unit: SubUnit) -> bool {
        self.completed.contains(&unit)
    }

    /// Marks `unit` complete. Returns false (and changes nothing) if it already was.
    ///
    /// `module_order` is the course's module ids in order; it drives both the
    /// percentage denominator and the current-module pointer.
    pub fn complete(&mut self, unit: SubUnit, module_order: &[i64], has_course_quiz: bool) -> bool {
        if self.is_completed(unit) {
            return false;
        }
        self.completed.push(unit);

        let total = module_order.len() + usize::from(has_course_quiz);
        self.progress_percentage = if total > 0 {
            (100.0 * self.completed.len() as f64 / total as f64).min(100.0)
        } else {
            0.0
        };
        self.current_module = module_order
            .iter()
            .copied()
            .find(|id| !self.is_completed(SubUnit::Module(*id)));
        self.updated_at = chrono::Utc::now();
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Story,
    Scenario,
    Kit,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Story => "story",
            GameType::Scenario => "scenario",
            GameType::Kit => "kit",
        }
    }
}

impl FromStr for GameType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "story" => Ok(GameType::Story),
            "scenario" => Ok(GameType::Scenario),
            "kit" => Ok(GameType::Kit),
            other => Err(format!("unknown game type '{}'", other)),
        }
    }
}

pub const MAX_GAME_LEVEL: u32 = 10;

/// Per-learner, per-game progress entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameProgress {
    pub user_id: i64,
    pub game_type: GameType,
    pub level: u32,
    pub score: i64,
    pub plays: u32,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl GameProgress {
    pub fn new(user_id: i64, game_type: GameType) -> Self {
        Self {
            user_id,
            game_type,
            level: 1,
            score: 0,
            plays: 0,
            completed_at: None,
        }
    }
}

/// A change to one game's progress entry, applied atomically with the
/// learner's cumulative score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameUpdate {
    /// Opening a game: optionally bump the level and add base points to the game score.
    Start { level_up: bool, base_points: i64 },
    /// Finishing a round with a (possibly negative) point delta.
    Finish { points: i64 },
}

impl GameUpdate {
    /// Applies the update; returns the amount credited to the cumulative score.
    pub fn apply(&self, entry: &mut GameProgress, existed: bool) -> i64 {
        match *self {
            GameUpdate::Start { level_up, base_points } => {
                if existed && level_up {
                    entry.level = (entry.level + 1).min(MAX_GAME_LEVEL);
                }
                entry.score = (entry.score + base_points).max(0);
                if !existed {
                    entry.completed_at = Some(chrono::Utc::now());
                }
                0
            }
            GameUpdate::Finish { points } => {
                entry.score = (entry.score + points).max(0);
                entry.plays += 1;
                entry.completed_at = Some(chrono::Utc::now());
                points.max(0)
            }
        }
    }
}
