// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    models::game::GameCatalog,
    services::evaluator::AttemptEvaluator,
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub evaluator: AttemptEvaluator,
    pub games: Arc<GameCatalog>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config, games: GameCatalog) -> Self {
        Self {
            evaluator: AttemptEvaluator::new(store.clone()),
            store,
            config,
            games: Arc::new(games),
        }
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for AttemptEvaluator {
    fn from_ref(state: &AppState) -> Self {
        state.evaluator.clone()
    }
}

impl FromRef<AppState> for Arc<GameCatalog> {
    fn from_ref(state: &AppState) -> Self {
        state.games.clone()
    }
}
