//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like database pools and the tutor.

use crate::config::Config;
use std::sync::Arc;
use tutor_core::tutor::Tutor;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<crate::db::Db>,
    pub tutor: Arc<Tutor>,
    pub config: Arc<Config>,
}

/// Builds a state whose pool never connects until first used.
#[cfg(test)]
pub(crate) fn test_state(database_url: &str) -> AppState {
    use crate::{config::Config, db::Db};
    use sqlx::postgres::PgPoolOptions;
    use tutor_core::{
        provider::{DEFAULT_CHAT_MODEL, Provider, ProviderSettings, build_llm_client},
        roster::Roster,
    };

    let llm = ProviderSettings {
        provider: Provider::GitHubModels,
        api_key: "test-token".to_string(),
        model: DEFAULT_CHAT_MODEL.to_string(),
        api_base: "https://example.invalid".to_string(),
        api_version: None,
    };
    let config = Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: database_url.to_string(),
        llm: llm.clone(),
        log_level: tracing::Level::INFO,
        prompts_path: "./prompts".into(),
        study_plan_dir: "study_plans".into(),
        max_tool_rounds: 4,
    };
    let pool = PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_millis(500))
        .connect_lazy(&config.database_url)
        .unwrap();
    let roster = Arc::new(Roster::load(None).unwrap());
    AppState {
        db: Arc::new(Db::new(pool)),
        tutor: Arc::new(Tutor::new(build_llm_client(&llm), roster, 4)),
        config: Arc::new(config),
    }
}
